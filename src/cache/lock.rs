//! Cross-process file locking for cache coordination.
//!
//! Serialises population of a single cache key across threads and processes.
//! On Unix systems, uses `flock(2)` for advisory locking. On non-Unix
//! platforms, locking is a no-op.

use camino::Utf8Path;
use std::fs::{File, OpenOptions};
use std::io;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Guard that holds a file lock until dropped.
///
/// The lock is automatically released when the guard goes out of scope,
/// including when the holder unwinds.
#[derive(Debug)]
pub struct CacheLock {
    _file: File,
}

impl CacheLock {
    /// Acquires an exclusive lock on `lock_path`, blocking until it is free.
    ///
    /// Each call opens its own file description, so two threads of one
    /// process exclude each other as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or the lock cannot
    /// be acquired.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use scie_lift::cache::CacheLock;
    ///
    /// let _lock = CacheLock::acquire_exclusive(Utf8Path::new("/tmp/science/1/abc.lck"))?;
    /// // Exclusive access to cache key `abc`
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn acquire_exclusive(lock_path: &Utf8Path) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;
        Self::lock(file)
    }

    #[cfg(unix)]
    fn lock(file: File) -> io::Result<Self> {
        // SAFETY: The file descriptor obtained from `file.as_raw_fd()` is valid
        // because `file` was opened via `OpenOptions::open` and remains owned by
        // this scope until after the `flock` call completes.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { _file: file })
    }

    #[cfg(not(unix))]
    fn lock(file: File) -> io::Result<Self> {
        Ok(Self { _file: file })
    }
}
