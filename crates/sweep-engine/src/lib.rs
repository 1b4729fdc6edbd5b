//! Sweep engine for dependency-artifact caches
//!
//! Prunes stale entries from a Gradle-style cache directory using an access
//! journal as the source of truth for "last used" timestamps. Each cache root
//! goes through a two-phase protocol:
//!
//! 1. **Plan** under an exclusive `prepare` lock: a layout-specific eviction
//!    strategy scans the root with a [`WorkerPool`] and fills a
//!    [`DeletionQueue`].
//! 2. **Commit** under an exclusive `perform` lock: every queued candidate is
//!    deleted, its journal keys are removed, and emptied parent directories
//!    are pruned.
//!
//! The journal, lock manager and deleter are narrow traits so the engine can
//! run against in-memory stand-ins in tests.

pub mod controller;
pub mod deleter;
pub mod error;
pub mod journal;
pub mod lock;
pub mod oracle;
pub mod pool;
pub mod queue;
pub mod root;
pub mod strategy;

pub use controller::{ControllerConfig, RootOutcome, RootState, SweepController, SweepSummary};
pub use deleter::{Deleter, FsDeleter};
pub use error::{SweepError, SweepResult};
pub use journal::{
    FileJournal, Journal, JournalError, JournalResult, MemoryJournal, SharedJournal, Timestamp,
};
pub use lock::{CacheLock, FlockLockManager, LockError, LockHandle, LockManager, LockResult, LockRole};
pub use oracle::StalenessOracle;
pub use pool::{PoolReport, WorkerPool, DEFAULT_SHUTDOWN_TIMEOUT};
pub use queue::{CandidateKind, DeletionCandidate, DeletionQueue, PrunePlan};
pub use root::{discover_roots, CacheKind, CacheRoot};
pub use strategy::{
    EvictionStrategy, JarsEvictionStrategy, ModulesEvictionStrategy, StrategyReport,
    DEFAULT_CACHE_KEY_LENGTH,
};
