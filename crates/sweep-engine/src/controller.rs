//! Two-phase sweep controller
//!
//! Every cache root moves through an explicit state machine:
//!
//! ```text
//! Discovered -> Planning -> Planned -> Committing -> Done
//!                  |                       |
//!                  +-------> Errored <-----+
//! ```
//!
//! Planning runs the root's eviction strategy under the `prepare` lock.
//! That lock is released, whatever the outcome, before the `perform` lock is
//! requested; another process may touch the cache in between. Committing
//! deletes every planned candidate under the `perform` lock, forgets the
//! journal keys of the candidates that were actually removed, and finally
//! removes the parent directories the plan emptied if they are still empty.
//!
//! A failure while planning abandons that root only. A failure to delete one
//! candidate is recorded and the remaining candidates are still processed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::deleter::{Deleter, FsDeleter};
use crate::error::{SweepError, SweepResult};
use crate::journal::{SharedJournal, Timestamp};
use crate::lock::{LockHandle, LockManager, LockRole};
use crate::oracle::StalenessOracle;
use crate::pool::{WorkerPool, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::queue::{CandidateKind, DeletionCandidate, DeletionQueue, PrunePlan};
use crate::root::{CacheKind, CacheRoot};
use crate::strategy::{strategy_for, EvictionStrategy, StrategyReport, DEFAULT_CACHE_KEY_LENGTH};

/// Lifecycle state of one cache root within a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootState {
    Discovered,
    Planning,
    Planned,
    Committing,
    Done,
    Errored,
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Entries last used before this timestamp are eligible
    pub deadline: Timestamp,
    /// Scan threads per root
    pub workers: usize,
    /// How long a root's scan may take before the pool stops claiming
    pub shutdown_timeout: Duration,
    /// Name length of jar cache entries
    pub cache_key_length: usize,
    /// Plan and report without deleting anything
    pub dry_run: bool,
}

impl ControllerConfig {
    pub fn new(deadline: Timestamp) -> Self {
        Self {
            deadline,
            workers: 1,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            cache_key_length: DEFAULT_CACHE_KEY_LENGTH,
            dry_run: false,
        }
    }
}

/// What happened to one cache root.
#[derive(Debug, Clone, Serialize)]
pub struct RootOutcome {
    pub path: PathBuf,
    pub kind: CacheKind,
    pub state: RootState,
    /// Every state the root went through, in order
    pub history: Vec<RootState>,
    /// Items the strategy handed to the worker pool
    pub scanned: usize,
    /// Primary entries selected for deletion
    pub planned: usize,
    /// Primary entries removed
    pub deleted: usize,
    /// Metadata mirrors removed
    pub mirrors_deleted: usize,
    /// Emptied parent directories removed
    pub pruned: usize,
    /// Times a lock on this root was found held elsewhere
    pub contentions: usize,
    /// Whether the scan finished before the pool shutdown timeout
    pub drained: bool,
    /// Per-candidate failures that did not stop the commit
    pub failures: Vec<String>,
    /// Error that abandoned the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RootOutcome {
    fn discovered(root: &CacheRoot) -> Self {
        Self {
            path: root.path.clone(),
            kind: root.kind,
            state: RootState::Discovered,
            history: vec![RootState::Discovered],
            scanned: 0,
            planned: 0,
            deleted: 0,
            mirrors_deleted: 0,
            pruned: 0,
            contentions: 0,
            drained: true,
            failures: Vec::new(),
            error: None,
        }
    }

    fn transition(&mut self, next: RootState) {
        debug!(root = %self.path.display(), from = ?self.state, to = ?next, "root state");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, err: SweepError) {
        error!(root = %self.path.display(), error = %err, "abandoning cache root");
        self.error = Some(err.to_string());
        self.transition(RootState::Errored);
    }
}

/// Result of sweeping every discovered root.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub roots: Vec<RootOutcome>,
    /// Roots whose layout is not recognized
    pub ignored: Vec<PathBuf>,
}

impl SweepSummary {
    /// Primary entries removed across all roots.
    pub fn deleted(&self) -> usize {
        self.roots.iter().map(|r| r.deleted).sum()
    }

    /// Primary entries selected across all roots.
    pub fn planned(&self) -> usize {
        self.roots.iter().map(|r| r.planned).sum()
    }

    pub fn errored(&self) -> usize {
        self.roots
            .iter()
            .filter(|r| r.state == RootState::Errored)
            .count()
    }

    pub fn failures(&self) -> usize {
        self.roots.iter().map(|r| r.failures.len()).sum()
    }
}

/// Drives the plan/commit protocol over cache roots.
pub struct SweepController<L, D = FsDeleter> {
    locks: L,
    deleter: D,
    config: ControllerConfig,
}

impl<L: LockManager, D: Deleter> SweepController<L, D> {
    pub fn new(locks: L, deleter: D, config: ControllerConfig) -> Self {
        Self {
            locks,
            deleter,
            config,
        }
    }

    /// Sweep `roots` one after the other.
    pub fn run(&self, roots: &[CacheRoot], journal: &SharedJournal) -> SweepSummary {
        let mut summary = SweepSummary::default();

        for root in roots {
            match strategy_for(root.kind, self.config.cache_key_length) {
                Some(strategy) => {
                    info!(root = %root.path.display(), strategy = strategy.name(), "sweeping cache");
                    summary
                        .roots
                        .push(self.sweep_root(root, strategy.as_ref(), journal));
                }
                None => {
                    info!(root = %root.path.display(), "ignoring unrecognized cache");
                    summary.ignored.push(root.path.clone());
                }
            }
        }

        summary
    }

    /// Plan and commit a single root with the given strategy.
    pub fn sweep_root(
        &self,
        root: &CacheRoot,
        strategy: &dyn EvictionStrategy,
        journal: &SharedJournal,
    ) -> RootOutcome {
        let mut outcome = RootOutcome::discovered(root);
        let contentions = AtomicUsize::new(0);
        let on_contention = |lock: &Path| {
            contentions.fetch_add(1, Ordering::Relaxed);
            warn!(lock = %lock.display(), "contended cache, waiting for lock");
        };

        outcome.transition(RootState::Planning);
        let queue = Arc::new(DeletionQueue::new());
        let planned = self.plan(root, strategy, journal, &queue, &on_contention);
        outcome.contentions = contentions.load(Ordering::Relaxed);

        let report = match planned {
            Ok(report) => report,
            Err(e) => {
                outcome.fail(e);
                return outcome;
            }
        };
        outcome.scanned = report.scanned;
        outcome.planned = report.evicted;
        outcome.drained = report.drained;
        if !report.drained {
            warn!(
                root = %root.path.display(),
                "scan did not finish, committing what was planned under the prepare lock"
            );
        }
        outcome.transition(RootState::Planned);
        info!(
            root = %root.path.display(),
            scanned = report.scanned,
            planned = report.evicted,
            "deletion plan ready"
        );

        outcome.transition(RootState::Committing);
        let (candidates, prune) = queue.drain();

        if self.config.dry_run {
            for candidate in &candidates {
                info!(path = %candidate.path.display(), "dry run, would remove");
            }
            outcome.transition(RootState::Done);
            return outcome;
        }

        let lock = match self
            .locks
            .acquire_exclusive(&root.path, LockRole::Perform, &on_contention)
        {
            Ok(lock) => lock,
            Err(e) => {
                outcome.contentions = contentions.load(Ordering::Relaxed);
                outcome.fail(e.into());
                return outcome;
            }
        };
        outcome.contentions = contentions.load(Ordering::Relaxed);

        lock.run_exclusive(|| {
            self.commit(candidates, journal, &mut outcome);
            self.prune(&prune, &mut outcome);
        });
        if let Err(e) = lock.release() {
            warn!(root = %root.path.display(), error = %e, "failed to release perform lock");
        }

        info!(
            root = %root.path.display(),
            deleted = outcome.deleted,
            mirrors = outcome.mirrors_deleted,
            pruned = outcome.pruned,
            failures = outcome.failures.len(),
            "cache swept"
        );
        outcome.transition(RootState::Done);
        outcome
    }

    /// Run the strategy under the `prepare` lock, releasing it on every path.
    fn plan(
        &self,
        root: &CacheRoot,
        strategy: &dyn EvictionStrategy,
        journal: &SharedJournal,
        queue: &Arc<DeletionQueue>,
        on_contention: &dyn Fn(&Path),
    ) -> SweepResult<StrategyReport> {
        let lock = self
            .locks
            .acquire_exclusive(&root.path, LockRole::Prepare, on_contention)?;

        let oracle = StalenessOracle::new(Arc::clone(journal), self.config.deadline);
        let pool = WorkerPool::new(self.config.workers)
            .with_shutdown_timeout(self.config.shutdown_timeout);
        let result = lock.run_exclusive(|| {
            let planned = strategy.plan(&root.path, &oracle, &pool, queue);
            // workers that outlived the pool timeout must not add to the plan unlocked
            queue.seal();
            planned
        });

        if let Err(e) = lock.release() {
            warn!(root = %root.path.display(), error = %e, "failed to release prepare lock");
        }
        result
    }

    fn commit(
        &self,
        candidates: Vec<DeletionCandidate>,
        journal: &SharedJournal,
        outcome: &mut RootOutcome,
    ) {
        for candidate in candidates {
            info!(path = %candidate.path.display(), "removing");

            match self.deleter.delete_recursively(&candidate.path) {
                Ok(()) => match candidate.kind {
                    CandidateKind::Entry => outcome.deleted += 1,
                    CandidateKind::Mirror => outcome.mirrors_deleted += 1,
                },
                // removed by someone else between the two locks
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %candidate.path.display(), "already gone");
                }
                Err(e) => {
                    warn!(path = %candidate.path.display(), error = %e, "failed to remove");
                    outcome
                        .failures
                        .push(format!("{}: {}", candidate.path.display(), e));
                    continue;
                }
            }

            let mut journal = journal.lock().unwrap_or_else(PoisonError::into_inner);
            for key in &candidate.journal_keys {
                if let Err(e) = journal.remove(key) {
                    warn!(key = %key.display(), error = %e, "failed to remove journal entry");
                    outcome.failures.push(format!("{}: {}", key.display(), e));
                }
            }
        }
    }

    /// Remove emptied parents; `remove_dir` refuses anything that gained content.
    fn prune(&self, plan: &PrunePlan, outcome: &mut RootOutcome) {
        for dir in plan.dirs() {
            match fs::remove_dir(dir) {
                Ok(()) => {
                    info!(path = %dir.display(), "pruned empty directory");
                    outcome.pruned += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(path = %dir.display(), error = %e, "directory kept");
                }
            }
        }
    }
}
