//! Layout-specific eviction strategies
//!
//! A strategy scans one cache root while the `prepare` lock is held and
//! records what should go in the [`DeletionQueue`]. It never deletes
//! anything itself.

mod jars;
mod modules;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::error::SweepResult;
use crate::oracle::StalenessOracle;
use crate::pool::WorkerPool;
use crate::queue::DeletionQueue;
use crate::root::CacheKind;

pub use jars::{JarsEvictionStrategy, DEFAULT_CACHE_KEY_LENGTH};
pub use modules::ModulesEvictionStrategy;

/// What a strategy found while planning one root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StrategyReport {
    /// Items handed to the worker pool (jar entries or module groups)
    pub scanned: usize,
    /// Primary entries queued for deletion
    pub evicted: usize,
    /// Whether the worker pool drained before its shutdown timeout
    pub drained: bool,
}

/// Builds a deletion plan for one cache layout.
pub trait EvictionStrategy {
    fn name(&self) -> &'static str;

    fn plan(
        &self,
        root: &Path,
        oracle: &StalenessOracle,
        pool: &WorkerPool,
        queue: &Arc<DeletionQueue>,
    ) -> SweepResult<StrategyReport>;
}

/// Pick the strategy for a cache kind; `None` for unrecognized roots.
pub fn strategy_for(kind: CacheKind, cache_key_length: usize) -> Option<Box<dyn EvictionStrategy>> {
    match kind {
        CacheKind::Jars => Some(Box::new(JarsEvictionStrategy::new(cache_key_length))),
        CacheKind::Modules => Some(Box::new(ModulesEvictionStrategy::new())),
        CacheKind::Unrecognized => None,
    }
}
