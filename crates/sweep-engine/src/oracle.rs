//! Journal-backed staleness decisions.

use std::path::Path;
use std::sync::PoisonError;

use tracing::{debug, warn};

use crate::journal::{SharedJournal, Timestamp};

/// Answers whether a cache entry was last used before the deadline.
///
/// Entries the journal never recorded are not provably stale and are kept.
/// Every lookup goes through the journal's mutex, so one oracle (or any of
/// its clones) can be called from all pool workers at once.
#[derive(Clone)]
pub struct StalenessOracle {
    journal: SharedJournal,
    deadline: Timestamp,
}

impl StalenessOracle {
    pub fn new(journal: SharedJournal, deadline: Timestamp) -> Self {
        Self { journal, deadline }
    }

    /// `true` only when a timestamp is recorded and it is older than the deadline.
    pub fn is_stale(&self, path: &Path) -> bool {
        let recorded = {
            let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
            journal.lookup(path)
        };

        match recorded {
            Ok(Some(timestamp)) => {
                let stale = timestamp < self.deadline;
                debug!(path = %path.display(), timestamp, stale, "journal lookup");
                stale
            }
            Ok(None) => {
                debug!(path = %path.display(), "not in journal, keeping");
                false
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "journal lookup failed, keeping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Journal, JournalError, JournalResult, MemoryJournal};
    use std::io;
    use std::sync::{Arc, Mutex};

    fn oracle(deadline: Timestamp) -> StalenessOracle {
        let journal = MemoryJournal::new()
            .with_entry("/c/old", 99)
            .with_entry("/c/exact", 100)
            .with_entry("/c/new", 101);
        StalenessOracle::new(journal.into_shared(), deadline)
    }

    #[test]
    fn test_older_than_deadline_is_stale() {
        assert!(oracle(100).is_stale(Path::new("/c/old")));
    }

    #[test]
    fn test_at_or_after_deadline_is_kept() {
        let oracle = oracle(100);
        assert!(!oracle.is_stale(Path::new("/c/exact")));
        assert!(!oracle.is_stale(Path::new("/c/new")));
    }

    #[test]
    fn test_unrecorded_is_kept() {
        assert!(!oracle(i64::MAX).is_stale(Path::new("/c/unknown")));
    }

    struct BrokenJournal;

    impl Journal for BrokenJournal {
        fn lookup(&mut self, path: &Path) -> JournalResult<Option<Timestamp>> {
            Err(JournalError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "boom"),
            })
        }

        fn remove(&mut self, _path: &Path) -> JournalResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_error_is_kept() {
        let journal: SharedJournal = Arc::new(Mutex::new(BrokenJournal));
        let oracle = StalenessOracle::new(journal, i64::MAX);
        assert!(!oracle.is_stale(Path::new("/c/anything")));
    }
}
