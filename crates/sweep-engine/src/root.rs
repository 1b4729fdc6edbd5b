//! Cache root discovery
//!
//! A cache root is an immediate child directory of the caches directory. Its
//! layout is inferred from the name prefix: `jars-*` roots hold flat
//! hash-keyed entries, `modules-*` roots hold the group/artifact/version
//! hierarchy. Anything else is reported and left alone.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{SweepError, SweepResult};

/// Layout of a cache root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Flat directories named by a fixed-length hash
    Jars,
    /// Hierarchical group/artifact/version trees plus metadata descriptors
    Modules,
    /// Not a layout the sweep knows how to evict
    Unrecognized,
}

impl CacheKind {
    const JARS_PREFIX: &'static str = "jars-";
    const MODULES_PREFIX: &'static str = "modules-";

    /// Infer the kind from a directory name.
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(Self::JARS_PREFIX) {
            Self::Jars
        } else if name.starts_with(Self::MODULES_PREFIX) {
            Self::Modules
        } else {
            Self::Unrecognized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jars => "jars",
            Self::Modules => "modules",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
    pub path: PathBuf,
    pub kind: CacheKind,
}

impl CacheRoot {
    /// Build a root from a path, inferring the kind from its final component.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(CacheKind::from_name)
            .unwrap_or(CacheKind::Unrecognized);
        Self { path, kind }
    }
}

/// List every cache root directly beneath `caches_dir`, sorted by name.
///
/// `caches_dir` is canonicalized first: the journal records absolute paths,
/// so every path derived from a root must be absolute as well.
pub fn discover_roots(caches_dir: &Path) -> SweepResult<Vec<CacheRoot>> {
    let caches_dir =
        fs::canonicalize(caches_dir).map_err(|e| SweepError::listing(caches_dir, e))?;
    let roots = child_dirs(&caches_dir, |_| true)?
        .into_iter()
        .map(CacheRoot::new)
        .collect();
    Ok(roots)
}

/// List the immediate child directories of `dir` whose name passes `filter`.
///
/// Symbolic links are not followed. The result is sorted by file name.
pub(crate) fn child_dirs<F>(dir: &Path, filter: F) -> SweepResult<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| SweepError::listing(dir, e.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let keep = entry.file_name().to_str().map(&filter).unwrap_or(false);
        if keep {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}
