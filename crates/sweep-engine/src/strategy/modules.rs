//! Hierarchical module layout (`modules-*`)
//!
//! ```text
//! modules-2/
//!   files-2.1/<group>/<artifact>/<version>/<hash>/...   primary entries
//!   metadata-2.97/descriptors/<group>/<artifact>/<version>/...   mirror
//! ```
//!
//! The journal tracks the hash leaves. A version is evicted only when every
//! one of its leaves is stale, and its descriptor mirrors go with it. A
//! version without any leaf counts as stale.
//!
//! Artifact and group directories that lost a version are not removed here.
//! They are queued as prune targets and removed during commit, under the
//! `perform` lock, only if they are empty at that point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{EvictionStrategy, StrategyReport};
use crate::error::SweepResult;
use crate::oracle::StalenessOracle;
use crate::pool::WorkerPool;
use crate::queue::{DeletionCandidate, DeletionQueue};
use crate::root::child_dirs;

/// Evicts whole module versions from a modules cache.
#[derive(Debug, Clone, Default)]
pub struct ModulesEvictionStrategy;

impl ModulesEvictionStrategy {
    /// Prefix of the directories holding group/artifact/version trees.
    pub const FILES_PREFIX: &'static str = "files-";
    /// Name of the metadata subdirectory mirroring the files tree.
    pub const DESCRIPTORS_DIR: &'static str = "descriptors";

    pub fn new() -> Self {
        Self
    }
}

impl EvictionStrategy for ModulesEvictionStrategy {
    fn name(&self) -> &'static str {
        "modules"
    }

    fn plan(
        &self,
        root: &Path,
        oracle: &StalenessOracle,
        pool: &WorkerPool,
        queue: &Arc<DeletionQueue>,
    ) -> SweepResult<StrategyReport> {
        let mut groups = Vec::new();
        let mut mirrors = Vec::new();

        for child in child_dirs(root, |_| true)? {
            let is_files = child
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(Self::FILES_PREFIX));

            if is_files {
                let parts = child_dirs(&child, |_| true)?;
                info!(dir = %child.display(), groups = parts.len(), "checking module groups");
                groups.extend(parts);
            } else {
                let descriptors = child.join(Self::DESCRIPTORS_DIR);
                if descriptors.is_dir() {
                    debug!(dir = %descriptors.display(), "metadata mirror");
                    mirrors.push(descriptors);
                }
            }
        }

        let walker = ModuleWalker {
            oracle: oracle.clone(),
            queue: Arc::clone(queue),
            mirrors,
        };
        let report = pool.run(groups, move |group: &PathBuf| walker.sweep_group(group));

        Ok(StrategyReport {
            scanned: report.items,
            evicted: report.matched,
            drained: report.drained,
        })
    }
}

/// Per-group traversal run on pool workers.
struct ModuleWalker {
    oracle: StalenessOracle,
    queue: Arc<DeletionQueue>,
    mirrors: Vec<PathBuf>,
}

impl ModuleWalker {
    /// Evaluate every version under `group`; returns the number of versions evicted.
    fn sweep_group(&self, group: &Path) -> usize {
        let Some(artifacts) = self.list(group) else {
            return 0;
        };

        let mut evicted = 0;
        for artifact in &artifacts {
            let Some(versions) = self.list(artifact) else {
                continue;
            };

            let before = evicted;
            for version in &versions {
                let Some(leaves) = self.list(version) else {
                    continue;
                };
                // first live leaf keeps the whole version
                if let Some(live) = leaves.iter().find(|leaf| !self.oracle.is_stale(leaf)) {
                    debug!(version = %version.display(), live = %live.display(), "keeping version");
                    continue;
                }

                self.evict(group, artifact, version, leaves);
                evicted += 1;
            }

            // removed at commit only if nothing is left inside
            if evicted > before {
                self.queue.push_prune(artifact);
            }
        }
        if evicted > 0 {
            self.queue.push_prune(group);
        }
        evicted
    }

    fn evict(&self, group: &Path, artifact: &Path, version: &Path, leaves: Vec<PathBuf>) {
        info!(path = %version.display(), leaves = leaves.len(), "stale module version");

        if let (Some(g), Some(a), Some(v)) = (group.file_name(), artifact.file_name(), version.file_name()) {
            for mirror_root in &self.mirrors {
                let mirrored = mirror_root.join(g).join(a).join(v);
                if mirrored.exists() {
                    info!(path = %mirrored.display(), "stale module metadata");
                    self.queue.push(DeletionCandidate::mirror(mirrored));
                }
            }
        }

        self.queue.push(DeletionCandidate::composite(version, leaves));
    }

    fn list(&self, dir: &Path) -> Option<Vec<PathBuf>> {
        match child_dirs(dir, |_| true) {
            Ok(children) => Some(children),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                None
            }
        }
    }
}
