//! Deletion queue shared between the plan and commit phases.

use std::collections::BTreeSet;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// What a candidate represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// A primary cache entry (jar hash directory or module version)
    Entry,
    /// A metadata descriptor directory shadowing a module version
    Mirror,
}

/// A path selected for removal during planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCandidate {
    pub path: PathBuf,
    pub kind: CandidateKind,
    /// Journal keys to forget once `path` is gone
    pub journal_keys: Vec<PathBuf>,
}

impl DeletionCandidate {
    /// A primary entry whose own path is its journal key.
    pub fn entry(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            journal_keys: vec![path.clone()],
            path,
            kind: CandidateKind::Entry,
        }
    }

    /// A primary entry tracked in the journal through other keys.
    pub fn composite(path: impl Into<PathBuf>, journal_keys: Vec<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: CandidateKind::Entry,
            journal_keys,
        }
    }

    /// A metadata mirror; mirrors have no journal keys.
    pub fn mirror(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: CandidateKind::Mirror,
            journal_keys: Vec::new(),
        }
    }
}

/// Multi-producer queue of deletion candidates and prune targets.
///
/// Workers push concurrently during planning. The controller seals the queue
/// before the `prepare` lock is released and drains it once at commit time;
/// pushes arriving after the seal (from workers that outlived the pool's
/// shutdown timeout) are dropped.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    pending: Mutex<Pending>,
}

#[derive(Debug, Default)]
struct Pending {
    candidates: Vec<DeletionCandidate>,
    mirrors: BTreeSet<PathBuf>,
    prune: BTreeSet<PathBuf>,
    sealed: bool,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a candidate. Returns `false` if it was not queued: the queue is
    /// sealed, or the candidate is a mirror that is already queued.
    pub fn push(&self, candidate: DeletionCandidate) -> bool {
        let mut pending = self.pending();
        if pending.sealed {
            debug!(path = %candidate.path.display(), "queue sealed, dropping late candidate");
            return false;
        }
        if candidate.kind == CandidateKind::Mirror && !pending.mirrors.insert(candidate.path.clone()) {
            return false;
        }
        pending.candidates.push(candidate);
        true
    }

    /// Mark a directory for removal after the commit phase, if it is empty by then.
    pub fn push_prune(&self, dir: impl Into<PathBuf>) {
        let mut pending = self.pending();
        if !pending.sealed {
            pending.prune.insert(dir.into());
        }
    }

    /// Refuse every later push.
    pub fn seal(&self) {
        self.pending().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.pending().sealed
    }

    pub fn len(&self) -> usize {
        self.pending().candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seal the queue and take everything queued so far.
    pub fn drain(&self) -> (Vec<DeletionCandidate>, PrunePlan) {
        let mut pending = self.pending();
        pending.sealed = true;
        pending.mirrors.clear();
        let candidates = mem::take(&mut pending.candidates);
        let prune = mem::take(&mut pending.prune);
        (candidates, PrunePlan::new(prune))
    }
}

/// Directories to remove after deletions, deepest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    dirs: Vec<PathBuf>,
}

impl PrunePlan {
    fn new(dirs: BTreeSet<PathBuf>) -> Self {
        let mut dirs: Vec<PathBuf> = dirs.into_iter().collect();
        // children before parents
        dirs.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

fn depth(path: &Path) -> usize {
    path.components().count()
}
