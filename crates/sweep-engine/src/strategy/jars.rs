//! Flat hash-keyed layout (`jars-*`)
//!
//! Every immediate child directory whose name has the cache key length is an
//! independent entry, tracked in the journal under its own path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::{EvictionStrategy, StrategyReport};
use crate::error::SweepResult;
use crate::oracle::StalenessOracle;
use crate::pool::WorkerPool;
use crate::queue::{DeletionCandidate, DeletionQueue};
use crate::root::child_dirs;

/// Length of the hash naming each jar cache entry.
pub const DEFAULT_CACHE_KEY_LENGTH: usize = 32;

/// Evicts stale hash directories from a jars cache.
#[derive(Debug, Clone)]
pub struct JarsEvictionStrategy {
    key_length: usize,
}

impl Default for JarsEvictionStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_KEY_LENGTH)
    }
}

impl JarsEvictionStrategy {
    pub fn new(key_length: usize) -> Self {
        Self { key_length }
    }
}

impl EvictionStrategy for JarsEvictionStrategy {
    fn name(&self) -> &'static str {
        "jars"
    }

    fn plan(
        &self,
        root: &Path,
        oracle: &StalenessOracle,
        pool: &WorkerPool,
        queue: &Arc<DeletionQueue>,
    ) -> SweepResult<StrategyReport> {
        let key_length = self.key_length;
        let entries = child_dirs(root, |name| name.len() == key_length)?;
        info!(root = %root.display(), entries = entries.len(), "checking jar entries");

        let oracle = oracle.clone();
        let queue = Arc::clone(queue);
        let report = pool.run_filter(
            entries,
            move |entry: &PathBuf| oracle.is_stale(entry),
            move |entry| {
                info!(path = %entry.display(), "stale jar entry");
                queue.push(DeletionCandidate::entry(entry));
            },
        );

        Ok(StrategyReport {
            scanned: report.items,
            evicted: report.matched,
            drained: report.drained,
        })
    }
}
