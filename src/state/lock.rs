//! Directory-based coordination lock.
//!
//! Atomic `create_dir` is the sole acquisition primitive: the directory
//! existing means a login flow is being driven somewhere. There is no
//! lease expiry; a crash while holding the lock requires operator cleanup.
//! Acquisition hands back a guard that releases on drop, so the lock is
//! freed even when the holder unwinds.

use std::path::PathBuf;

use tracing::{debug, warn};

pub struct LoginLock {
    dir: PathBuf,
}

impl LoginLock {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Try to acquire the lock. None means another instance holds it -
    /// contention, not an error.
    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        if let Some(parent) = self.dir.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(dir = %self.dir.display(), error = %e, "cannot create lock parent");
                return None;
            }
        }
        match std::fs::create_dir(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "lock acquired");
                Some(LockGuard { lock: self })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => None,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "lock acquisition failed");
                None
            }
        }
    }

    fn release(&self) {
        match std::fs::remove_dir(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "lock release failed"),
        }
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        self.dir.exists()
    }
}

/// Holds the lock for its lifetime; dropping it releases unconditionally.
pub struct LockGuard<'a> {
    lock: &'a LoginLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
