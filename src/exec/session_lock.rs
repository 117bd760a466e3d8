//! Named file-lock mutex
//!
//! Serializes writes to the session metrics file across parallel activities.
//! Acquisition relies on exclusive file creation; a holder that disappears is
//! reclaimed after a bounded wait. The critical section must stay short
//! relative to the stale timeout.

use std::path::PathBuf;

use tokio::time::{sleep, Duration, Instant};

use crate::error::{Error, Result};

/// Poll interval while another holder owns the lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Age after which a lock file is presumed abandoned and reclaimed.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(10);

/// File-based mutex identified by its lock-file path
#[derive(Debug, Clone)]
pub struct SessionLock {
    path: PathBuf,
    stale_after: Duration,
}

impl SessionLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: LOCK_STALE_AFTER,
        }
    }

    /// Override the stale timeout (tests only need milliseconds).
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Acquire the lock, polling on collision and reclaiming stale holders.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let started = Instant::now();
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        released: false,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.stale_after {
                        // Holder presumed dead; force-unlink and retry.
                        tracing::warn!(
                            lock = %self.path.display(),
                            "reclaiming stale session lock"
                        );
                        let _ = std::fs::remove_file(&self.path);
                        continue;
                    }
                    sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(Error::Io(e));
                }
            }
        }
    }
}

/// Held lock; releases on drop, release is idempotent
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Unlink the lock file. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
            self.released = true;
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_lock_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camaudit_lock_{}_{}.lock", tag, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn acquire_and_release_cycle() {
        let path = temp_lock_path("cycle");
        let lock = SessionLock::new(&path);
        let mut guard = lock.acquire().await.unwrap();
        assert!(path.exists());
        guard.release();
        assert!(!path.exists());
        // Idempotent second release
        guard.release();
        // Reacquire works after release
        let _guard = lock.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn contended_lock_waits_for_holder() {
        let path = temp_lock_path("contended");
        let lock = SessionLock::new(&path);
        let guard = lock.acquire().await.unwrap();

        let lock2 = lock.clone();
        let waiter = tokio::spawn(async move { lock2.acquire().await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        let second = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed() {
        let path = temp_lock_path("stale");
        // Simulate a dead holder.
        std::fs::write(&path, b"").unwrap();

        let lock = SessionLock::new(&path).with_stale_after(Duration::from_millis(200));
        let guard = tokio::time::timeout(Duration::from_secs(3), lock.acquire())
            .await
            .expect("reclamation must not hang")
            .unwrap();
        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_releases_the_lock() {
        let path = temp_lock_path("drop");
        let lock = SessionLock::new(&path);
        {
            let _guard = lock.acquire().await.unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
