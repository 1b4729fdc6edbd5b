//! Error types for the sweep engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::journal::JournalError;
use crate::lock::LockError;

/// Sweep result type
pub type SweepResult<T> = Result<T, SweepError>;

/// Errors that abandon a single cache root.
///
/// Per-candidate failures during commit are never surfaced as a `SweepError`;
/// they are logged and counted in the root outcome instead.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("failed to list {}: {source}", path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SweepError {
    pub(crate) fn listing(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Listing {
            path: path.into(),
            source,
        }
    }
}
