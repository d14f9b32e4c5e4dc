//! Deferred deletion of staged files
//!
//! Each scheduled path gets a tokio timer task that deletes the file once the
//! grace period has passed. Pending deletions are keyed by path: scheduling a
//! path that is already pending cancels the earlier timer, so a later upload
//! of the same name keeps its files for the full grace period and a file is
//! never deleted twice by overlapping timers.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct PendingDeletion {
    generation: u64,
    token: CancellationToken,
}

/// Path-keyed scheduler for delayed file deletion
#[derive(Clone)]
pub struct CleanupScheduler {
    delay: Duration,
    pending: Arc<Mutex<HashMap<PathBuf, PendingDeletion>>>,
    next_generation: Arc<AtomicU64>,
}

impl CleanupScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedule each path for deletion after the grace period
    ///
    /// Returns immediately; deletion happens on detached tasks.
    pub async fn schedule<I>(&self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut pending = self.pending.lock().await;

        for path in paths {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();

            let previous = pending.insert(
                path.clone(),
                PendingDeletion {
                    generation,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.token.cancel();
                debug!(path = %path.display(), "Rescheduled pending deletion");
            }

            tokio::spawn(delete_after(
                self.pending.clone(),
                path,
                generation,
                token,
                self.delay,
            ));
        }
    }

    /// Cancel a pending deletion; returns whether one was pending
    pub async fn cancel(&self, path: &Path) -> bool {
        match self.pending.lock().await.remove(path) {
            Some(entry) => {
                entry.token.cancel();
                debug!(path = %path.display(), "Cancelled pending deletion");
                true
            }
            None => false,
        }
    }

    /// Number of deletions still waiting on their timer
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Cancel all timers and delete every pending file now
    ///
    /// Used on shutdown so staged files do not outlive the process. Returns
    /// the number of files actually removed.
    pub async fn flush(&self) -> usize {
        let drained: Vec<(PathBuf, PendingDeletion)> =
            self.pending.lock().await.drain().collect();

        let mut removed = 0;
        for (path, entry) in drained {
            entry.token.cancel();
            if delete_logged(&path).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Flushed pending cleanups");
        }
        removed
    }
}

async fn delete_after(
    pending: Arc<Mutex<HashMap<PathBuf, PendingDeletion>>>,
    path: PathBuf,
    generation: u64,
    token: CancellationToken,
    delay: Duration,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    // Superseded between timer expiry and taking the lock
    {
        let mut pending = pending.lock().await;
        match pending.get(&path) {
            Some(entry) if entry.generation == generation => {
                pending.remove(&path);
            }
            _ => return,
        }
    }

    delete_logged(&path).await;
}

async fn delete_logged(path: &Path) -> bool {
    match remove_file_if_exists(path).await {
        Ok(true) => {
            debug!(path = %path.display(), "Deleted staged file");
            true
        }
        Ok(false) => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to delete staged file");
            false
        }
    }
}

/// Delete a file, treating "already gone" as success
///
/// Returns `true` if a file was removed.
pub async fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(100);

    async fn wait_past(delay: Duration) {
        tokio::time::sleep(delay * 5).await;
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"data").unwrap();
        path
    }

    #[tokio::test]
    async fn test_files_removed_after_delay() {
        let temp_dir = TempDir::new().unwrap();
        let input = touch(temp_dir.path(), "deck.md");
        let output = touch(temp_dir.path(), "deck.md.pptx");

        let scheduler = CleanupScheduler::new(SHORT);
        scheduler.schedule([output.clone(), input.clone()]).await;

        assert!(input.exists() && output.exists(), "deleted before the delay");
        assert_eq!(scheduler.pending().await, 2);

        wait_past(SHORT).await;

        assert!(!input.exists());
        assert!(!output.exists());
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = touch(temp_dir.path(), "gone.md");

        assert!(remove_file_if_exists(&path).await.unwrap());
        assert!(!remove_file_if_exists(&path).await.unwrap());

        let scheduler = CleanupScheduler::new(SHORT);
        scheduler.schedule([path.clone()]).await;
        wait_past(SHORT).await;
        assert_eq!(scheduler.pending().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_keeps_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = touch(temp_dir.path(), "keep.md");

        let scheduler = CleanupScheduler::new(SHORT);
        scheduler.schedule([path.clone()]).await;
        assert!(scheduler.cancel(&path).await);
        assert!(!scheduler.cancel(&path).await);

        wait_past(SHORT).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_earlier_timer() {
        let temp_dir = TempDir::new().unwrap();
        let path = touch(temp_dir.path(), "shared.md");
        let delay = Duration::from_millis(400);

        let scheduler = CleanupScheduler::new(delay);
        scheduler.schedule([path.clone()]).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.schedule([path.clone()]).await;
        assert_eq!(scheduler.pending().await, 1);

        // First timer would have fired by now
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(path.exists(), "earlier timer was not cancelled");

        wait_past(delay).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_flush_deletes_pending_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let a = touch(temp_dir.path(), "a.md");
        let b = touch(temp_dir.path(), "b.md");

        let scheduler = CleanupScheduler::new(Duration::from_secs(3600));
        scheduler.schedule([a.clone(), b.clone()]).await;

        assert_eq!(scheduler.flush().await, 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(scheduler.pending().await, 0);
    }
}
