//! Recursive deletion of cache entries.

use std::fs;
use std::io;
use std::path::Path;

/// Removes a path and everything beneath it.
pub trait Deleter {
    fn delete_recursively(&self, path: &Path) -> io::Result<()>;
}

/// Filesystem deleter.
///
/// Symbolic links are removed as links and never followed, so a link inside
/// the cache cannot cause deletion outside of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDeleter;

impl Deleter for FsDeleter {
    fn delete_recursively(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}
