//! Advisory locking of cache roots
//!
//! Other build processes keep using the cache while a sweep runs, so every
//! phase that reads or mutates a root holds an exclusive advisory lock on
//! `<root>/<root-name>.lock`. The lock carries a role (`prepare` for
//! planning, `perform` for committing) used in diagnostics.
//!
//! Acquisition blocks until the lock is granted. The first time the lock is
//! found held by someone else, the contention callback fires once; it is
//! informational and does not affect the wait. An optional timeout turns an
//! unbounded wait into [`LockError::Timeout`].

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{role} lock on {} not acquired after {waited:?}", path.display())]
    Timeout {
        path: PathBuf,
        role: LockRole,
        waited: Duration,
    },

    #[error("I/O error on lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Phase a lock is taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockRole {
    /// Scanning a root and building the deletion plan
    Prepare,
    /// Executing the deletion plan
    Perform,
}

impl LockRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Perform => "perform",
        }
    }
}

impl fmt::Display for LockRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A held exclusive lock.
pub trait LockHandle {
    fn role(&self) -> LockRole;

    /// Run `body` while the lock is held.
    fn run_exclusive<R>(&self, body: impl FnOnce() -> R) -> R {
        body()
    }

    /// Release the lock. Dropping a handle releases it as well.
    fn release(self) -> LockResult<()>;
}

/// Hands out exclusive locks on cache roots.
pub trait LockManager {
    type Handle: LockHandle;

    /// Block until an exclusive lock on `root` is held for `role`.
    ///
    /// `on_contention` is called at most once, with the lock file path, when
    /// the lock is found held elsewhere.
    fn acquire_exclusive(
        &self,
        root: &Path,
        role: LockRole,
        on_contention: &dyn Fn(&Path),
    ) -> LockResult<Self::Handle>;
}

/// `flock(2)`-based lock manager.
#[derive(Debug, Clone)]
pub struct FlockLockManager {
    timeout: Option<Duration>,
    poll_interval: Duration,
}

impl Default for FlockLockManager {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl FlockLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up with [`LockError::Timeout`] after `timeout` instead of waiting forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl LockManager for FlockLockManager {
    type Handle = CacheLock;

    fn acquire_exclusive(
        &self,
        root: &Path,
        role: LockRole,
        on_contention: &dyn Fn(&Path),
    ) -> LockResult<CacheLock> {
        CacheLock::acquire(root, role, self.timeout, self.poll_interval, on_contention)
    }
}

/// Advisory file lock on a cache root.
///
/// The lock is automatically released when this struct is dropped.
pub struct CacheLock {
    lock_path: PathBuf,
    role: LockRole,
    lock_file: File,
    released: bool,
}

impl CacheLock {
    /// Path of the lock file guarding `root`.
    pub fn lock_path_for(root: &Path) -> PathBuf {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache".to_string());
        root.join(format!("{}.lock", name))
    }

    fn acquire(
        root: &Path,
        role: LockRole,
        timeout: Option<Duration>,
        poll_interval: Duration,
        on_contention: &dyn Fn(&Path),
    ) -> LockResult<Self> {
        let lock_path = Self::lock_path_for(root);
        let start = Instant::now();
        let mut contended = false;

        loop {
            match Self::try_acquire_exclusive(&lock_path) {
                Ok(file) => {
                    if contended {
                        debug!(
                            lock = %lock_path.display(),
                            %role,
                            waited_ms = start.elapsed().as_millis() as u64,
                            "lock acquired after contention"
                        );
                    }
                    return Ok(Self {
                        lock_path,
                        role,
                        lock_file: file,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !contended {
                        on_contention(&lock_path);
                        contended = true;
                    }
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: lock_path,
                        source,
                    })
                }
            }

            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(LockError::Timeout {
                        path: lock_path,
                        role,
                        waited: start.elapsed(),
                    });
                }
            }

            std::thread::sleep(poll_interval);
        }
    }

    /// Try to acquire an exclusive lock on the file.
    #[cfg(unix)]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(lock_path)?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    /// Try to acquire an exclusive lock on the file (non-Unix fallback).
    #[cfg(not(unix))]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(unix)]
    fn unlock(&mut self) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        self.released = true;
        let result = unsafe { libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn unlock(&mut self) -> io::Result<()> {
        self.released = true;
        std::fs::remove_file(&self.lock_path)
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl LockHandle for CacheLock {
    fn role(&self) -> LockRole {
        self.role
    }

    fn release(mut self) -> LockResult<()> {
        self.unlock().map_err(|source| LockError::Io {
            path: self.lock_path.clone(),
            source,
        })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.unlock();
        }
    }
}

impl fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLock")
            .field("lock_path", &self.lock_path)
            .field("role", &self.role)
            .field("released", &self.released)
            .finish()
    }
}
