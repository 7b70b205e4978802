//! Retention sweeper: periodically deletes blobs older than the TTL.
//!
//! A pass lists the store directory and deletes every entry whose age
//! exceeds the retention window. No store-wide lock is taken; concurrent
//! uploads and lookups race only at the level of single-file operations.
//! Per-file failures are logged, counted and skipped.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blob_store::BlobStore;

/// Outcome of a single sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Files inspected.
    pub files_scanned: u64,
    /// Files deleted because they exceeded the TTL.
    pub files_deleted: u64,
    /// Stat or delete failures that were skipped.
    pub errors: u64,
}

/// Cumulative statistics published by a running sweeper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperStats {
    /// Completed passes.
    pub sweeps: u64,
    /// Files inspected across all passes.
    pub files_scanned: u64,
    /// Files deleted across all passes.
    pub files_deleted: u64,
    /// Failures across all passes.
    pub errors: u64,
    /// The most recent pass.
    pub last: SweepStats,
}

impl SweeperStats {
    fn record(&mut self, pass: SweepStats) {
        self.sweeps += 1;
        self.files_scanned += pass.files_scanned;
        self.files_deleted += pass.files_deleted;
        self.errors += pass.errors;
        self.last = pass;
    }
}

/// Deletes stored blobs whose last modification is older than `ttl`.
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    store: Arc<BlobStore>,
    ttl: Duration,
}

impl RetentionSweeper {
    /// Creates a sweeper over `store` with retention window `ttl`.
    pub fn new(store: Arc<BlobStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Retention window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true if a file modified at `modified` is expired at `now`.
    /// Modification times in the future count as age zero.
    pub fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        age > self.ttl
    }

    /// Runs one pass against the current wall clock.
    pub async fn sweep(&self) -> SweepStats {
        self.sweep_at(SystemTime::now()).await
    }

    /// Runs one pass, judging age against `now`.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepStats {
        let store = self.store.clone();
        self.sweep_with(now, move |path| {
            let store = store.clone();
            async move { store.delete(&path).await }
        })
        .await
    }

    /// One pass where `delete` removes each expired path.
    async fn sweep_with<F, Fut>(&self, now: SystemTime, mut delete: F) -> SweepStats
    where
        F: FnMut(PathBuf) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut stats = SweepStats::default();

        let mut entries = match self.store.list().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "sweep could not list store directory");
                stats.errors += 1;
                return stats;
            }
        };

        while let Some(entry) = entries.next_entry().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "sweep skipped unreadable entry");
                    stats.errors += 1;
                    continue;
                }
            };
            stats.files_scanned += 1;

            if !self.is_expired(entry.modified, now) {
                continue;
            }

            debug!(file = %entry.file_name, "blob expired");
            if delete(entry.path.clone()).await {
                stats.files_deleted += 1;
            } else if fs::try_exists(&entry.path).await.unwrap_or(false) {
                // Still present: the delete genuinely failed.
                warn!(file = %entry.file_name, "expired blob was not deleted");
                stats.errors += 1;
            }
        }

        info!(
            scanned = stats.files_scanned,
            deleted = stats.files_deleted,
            errors = stats.errors,
            "sweep complete"
        );
        stats
    }

    /// Starts the periodic background task.
    ///
    /// The first pass runs one `period` after start. The task exits when
    /// `shutdown` is cancelled.
    pub fn spawn(self, period: Duration, shutdown: CancellationToken) -> SweeperHandle {
        let (stats_tx, stats_rx) = watch::channel(SweeperStats::default());
        let token = shutdown.clone();

        let join = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                ttl_secs = self.ttl.as_secs(),
                period_secs = period.as_secs(),
                "retention sweeper started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let pass = self.sweep().await;
                        stats_tx.send_modify(|s| s.record(pass));
                    }
                }
            }
            info!("retention sweeper stopped");
        });

        SweeperHandle {
            join,
            shutdown,
            stats: stats_rx,
        }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    join: JoinHandle<()>,
    shutdown: CancellationToken,
    stats: watch::Receiver<SweeperStats>,
}

impl SweeperHandle {
    /// Snapshot of cumulative statistics.
    pub fn stats(&self) -> SweeperStats {
        *self.stats.borrow()
    }

    /// A receiver that observes every published update.
    pub fn subscribe(&self) -> watch::Receiver<SweeperStats> {
        self.stats.clone()
    }

    /// Returns true while the background task is alive.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Cancels the task and waits for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "retention sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(3600);

    async fn setup() -> (TempDir, Arc<BlobStore>, RetentionSweeper) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(BlobStore::open(&StoreConfig::new(dir.path())).await.unwrap());
        let sweeper = RetentionSweeper::new(store.clone(), TTL);
        (dir, store, sweeper)
    }

    #[tokio::test]
    async fn test_is_expired_boundaries() {
        let (_dir, _store, sweeper) = setup().await;
        let now = SystemTime::now();
        let one = Duration::from_secs(1);

        assert!(sweeper.is_expired(now - TTL - one, now));
        assert!(!sweeper.is_expired(now - TTL + one, now));
        assert!(!sweeper.is_expired(now - TTL, now));
        assert!(!sweeper.is_expired(now + one, now));
    }

    #[tokio::test]
    async fn test_sweep_deletes_expired_blob() {
        let (_dir, store, sweeper) = setup().await;
        let record = store.store_bytes(b"old", "a.docx").await.unwrap();

        let now = record.modified_at + TTL + Duration::from_secs(1);
        let stats = sweeper.sweep_at(now).await;

        assert_eq!(stats.files_scanned, 1);
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.errors, 0);
        assert!(store.resolve(&record.id).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_keeps_young_blob() {
        let (_dir, store, sweeper) = setup().await;
        let record = store.store_bytes(b"new", "a.docx").await.unwrap();

        let now = record.modified_at + TTL - Duration::from_secs(1);
        let stats = sweeper.sweep_at(now).await;

        assert_eq!(stats.files_scanned, 1);
        assert_eq!(stats.files_deleted, 0);
        assert_eq!(store.resolve(&record.id).await.unwrap(), record.stored_path);
    }

    #[tokio::test]
    async fn test_two_sweeps_before_ttl_keep_blob() {
        let (_dir, store, sweeper) = setup().await;
        let record = store.store_bytes(b"keep me", "a.docx").await.unwrap();

        sweeper.sweep().await;
        sweeper.sweep().await;

        assert_eq!(store.resolve(&record.id).await.unwrap(), record.stored_path);
    }

    #[tokio::test]
    async fn test_sweep_mixed_population() {
        let (_dir, store, sweeper) = setup().await;
        let old = store.store_bytes(b"old", "old.txt").await.unwrap();
        let young = store.store_bytes(b"young", "young.txt").await.unwrap();

        let old_file = std::fs::File::options()
            .write(true)
            .open(&old.stored_path)
            .unwrap();
        old_file
            .set_modified(SystemTime::now() - TTL - Duration::from_secs(60))
            .unwrap();
        drop(old_file);

        let stats = sweeper.sweep().await;
        assert_eq!(stats.files_scanned, 2);
        assert_eq!(stats.files_deleted, 1);
        assert!(store.resolve(&old.id).await.is_err());
        assert!(store.resolve(&young.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_delete_counted_and_sweep_continues() {
        let (_dir, store, sweeper) = setup().await;
        let stuck = store.store_bytes(b"stuck", "stuck.txt").await.unwrap();
        let gone = store.store_bytes(b"gone", "gone.txt").await.unwrap();

        let now = SystemTime::now() + TTL + Duration::from_secs(60);
        let stuck_path = stuck.stored_path.clone();
        let stats = sweeper
            .sweep_with(now, |path| {
                let store = store.clone();
                let fail = path == stuck_path;
                async move { !fail && store.delete(&path).await }
            })
            .await;

        assert_eq!(stats.files_scanned, 2);
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.errors, 1);
        assert!(stuck.stored_path.exists());
        assert!(!gone.stored_path.exists());
    }

    #[tokio::test]
    async fn test_entry_deleted_concurrently_is_not_an_error() {
        let (_dir, store, sweeper) = setup().await;
        let record = store.store_bytes(b"x", "a.txt").await.unwrap();

        let now = SystemTime::now() + TTL + Duration::from_secs(60);
        let stats = sweeper
            .sweep_with(now, |path| async move {
                std::fs::remove_file(&path).unwrap();
                false
            })
            .await;

        assert_eq!(stats.files_deleted, 0);
        assert_eq!(stats.errors, 0);
        assert!(!record.stored_path.exists());
    }

    #[tokio::test]
    async fn test_sweep_empty_store() {
        let (_dir, _store, sweeper) = setup().await;
        assert_eq!(sweeper.sweep().await, SweepStats::default());
    }

    #[tokio::test]
    async fn test_sweep_missing_directory_counts_error() {
        let (dir, store, sweeper) = setup().await;
        std::fs::remove_dir_all(store.root()).unwrap();
        let stats = sweeper.sweep().await;
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.files_scanned, 0);
        drop(dir);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_publishes_stats() {
        let (_dir, store, _) = setup().await;
        store.store_bytes(b"x", "a.txt").await.unwrap();

        let sweeper = RetentionSweeper::new(store.clone(), TTL);
        let handle = sweeper.spawn(Duration::from_millis(20), CancellationToken::new());
        let mut rx = handle.subscribe();
        assert_eq!(handle.stats().sweeps, 0);

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let stats = *rx.borrow();
        assert!(stats.sweeps >= 1);
        assert_eq!(stats.last.files_scanned, 1);
        assert_eq!(stats.files_deleted, 0);
        assert!(handle.is_running());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_sweeper_stops() {
        let (_dir, _store, sweeper) = setup().await;
        let token = CancellationToken::new();
        let handle = sweeper.spawn(Duration::from_secs(3600), token.clone());
        token.cancel();
        let stopped = tokio::time::timeout(Duration::from_secs(5), handle.shutdown()).await;
        assert!(stopped.is_ok());
    }

    #[test]
    fn test_cumulative_stats() {
        let mut total = SweeperStats::default();
        total.record(SweepStats {
            files_scanned: 3,
            files_deleted: 1,
            errors: 0,
        });
        total.record(SweepStats {
            files_scanned: 2,
            files_deleted: 2,
            errors: 1,
        });
        assert_eq!(total.sweeps, 2);
        assert_eq!(total.files_scanned, 5);
        assert_eq!(total.files_deleted, 3);
        assert_eq!(total.errors, 1);
        assert_eq!(total.last.files_deleted, 2);
    }
}
