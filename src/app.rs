//! Sweep orchestration
//!
//! Wires the engine's collaborators together from an [`EffectiveConfig`]:
//! discovers the cache roots, opens the journal, runs the controller with
//! advisory flock locking, then closes the journal and builds the report.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use sweep_engine::{
    discover_roots, ControllerConfig, FileJournal, FlockLockManager, FsDeleter, JournalError,
    SharedJournal, SweepController, SweepError, Timestamp,
};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{EffectiveConfig, SweepConfig};
use crate::summary::SweepReport;

/// Errors that stop a sweep before any root is processed.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot list caches: {0}")]
    Discovery(#[source] SweepError),

    #[error("cannot open journal: {0}")]
    Journal(#[from] JournalError),
}

impl From<&SweepConfig> for ControllerConfig {
    fn from(config: &SweepConfig) -> Self {
        ControllerConfig {
            workers: config.workers,
            shutdown_timeout: config.shutdown_timeout(),
            cache_key_length: config.cache_key_length,
            dry_run: config.dry_run,
            ..ControllerConfig::new(0)
        }
    }
}

/// Run one sweep with the given configuration and deadline.
pub fn run_sweep(effective: &EffectiveConfig, deadline: Timestamp) -> Result<SweepReport, AppError> {
    let config = &effective.config;
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start = Instant::now();

    info!(
        run_id = %run_id,
        caches = %config.caches_dir.display(),
        deadline,
        dry_run = config.dry_run,
        "starting sweep"
    );

    let roots = discover_roots(&config.caches_dir).map_err(AppError::Discovery)?;
    let journal_path = config.journal_path();
    let journal = FileJournal::open(&journal_path)?;
    info!(journal = %journal_path.display(), entries = journal.len(), "journal opened");
    let journal: SharedJournal = Arc::new(Mutex::new(journal));

    let mut locks = FlockLockManager::new();
    if let Some(timeout) = config.lock_timeout() {
        locks = locks.with_timeout(timeout);
    }
    let controller = SweepController::new(
        locks,
        FsDeleter,
        ControllerConfig {
            deadline,
            ..ControllerConfig::from(config)
        },
    );

    let summary = controller.run(&roots, &journal);

    let closed = journal.lock().unwrap_or_else(PoisonError::into_inner).close();

    let mut report = SweepReport::new(run_id, started_at, deadline, config.dry_run, summary)
        .with_config_sources(effective.sources.clone());
    if let Err(e) = closed {
        error!(journal = %journal_path.display(), error = %e, "failed to close journal");
        report = report.with_journal_error(e.to_string());
    }

    Ok(report.with_duration_ms(start.elapsed().as_millis() as u64))
}
