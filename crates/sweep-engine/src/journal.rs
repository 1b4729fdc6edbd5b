//! Access journal
//!
//! The journal maps cache-entry paths to their last-access timestamp in epoch
//! milliseconds. The sweep only ever reads timestamps and removes keys for
//! entries it has physically deleted.
//!
//! Implementations are not expected to be thread-safe: the engine shares a
//! journal between workers through [`SharedJournal`], a single mutex per run.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Last-access timestamp, epoch milliseconds.
pub type Timestamp = i64;

/// Journal result type
pub type JournalResult<T> = Result<T, JournalError>;

/// A journal shared between workers behind one mutual-exclusion point.
pub type SharedJournal = Arc<Mutex<dyn Journal + Send>>;

/// Errors from journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error on journal {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed journal {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key/timestamp store consulted by the sweep.
pub trait Journal {
    /// Last-access timestamp recorded for `path`, if any.
    fn lookup(&mut self, path: &Path) -> JournalResult<Option<Timestamp>>;

    /// Forget `path`. Removing an unknown key is not an error.
    fn remove(&mut self, path: &Path) -> JournalResult<()>;

    /// Flush and close the journal.
    fn close(&mut self) -> JournalResult<()> {
        Ok(())
    }
}

/// In-memory journal.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    entries: BTreeMap<PathBuf, Timestamp>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access of `path` at `timestamp`.
    pub fn record(&mut self, path: impl Into<PathBuf>, timestamp: Timestamp) {
        self.entries.insert(path.into(), timestamp);
    }

    /// Builder-style [`record`](Self::record).
    pub fn with_entry(mut self, path: impl Into<PathBuf>, timestamp: Timestamp) -> Self {
        self.record(path, timestamp);
        self
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wrap into a [`SharedJournal`].
    pub fn into_shared(self) -> SharedJournal {
        Arc::new(Mutex::new(self))
    }
}

impl Journal for MemoryJournal {
    fn lookup(&mut self, path: &Path) -> JournalResult<Option<Timestamp>> {
        Ok(self.entries.get(path).copied())
    }

    fn remove(&mut self, path: &Path) -> JournalResult<()> {
        self.entries.remove(path);
        Ok(())
    }
}

/// On-disk representation of a [`FileJournal`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalDocument {
    #[serde(default)]
    entries: BTreeMap<PathBuf, Timestamp>,
}

/// JSON-file journal.
///
/// The whole document is loaded on [`open`](Self::open) and written back on
/// [`close`](Journal::close) only if keys were removed. Writes go through a
/// temporary file and a rename so readers never see a torn document.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    entries: MemoryJournal,
    dirty: bool,
}

impl FileJournal {
    /// Open the journal at `path`. A missing file opens as an empty journal.
    pub fn open(path: impl Into<PathBuf>) -> JournalResult<Self> {
        let path = path.into();
        let document = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<JournalDocument>(&bytes).map_err(|source| {
                JournalError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => JournalDocument::default(),
            Err(source) => return Err(JournalError::Io { path, source }),
        };

        Ok(Self {
            path,
            entries: MemoryJournal {
                entries: document.entries,
            },
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&self) -> JournalResult<()> {
        let io_err = |source: io::Error| JournalError::Io {
            path: self.path.clone(),
            source,
        };

        let document = JournalDocument {
            entries: self.entries.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document).map_err(|source| {
            JournalError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl Journal for FileJournal {
    fn lookup(&mut self, path: &Path) -> JournalResult<Option<Timestamp>> {
        self.entries.lookup(path)
    }

    fn remove(&mut self, path: &Path) -> JournalResult<()> {
        if self.entries.contains(path) {
            self.entries.remove(path)?;
            self.dirty = true;
        }
        Ok(())
    }

    fn close(&mut self) -> JournalResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.write()?;
        self.dirty = false;
        Ok(())
    }
}
