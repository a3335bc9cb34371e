//! Periodic deletion of expired pixels
//!
//! The sweeper runs on its own tokio task and shares nothing with request
//! handling except the store. A request racing a sweep either sees the pixel
//! or gets not-found on its next call; both are fine.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info, warn};

use crate::config::MAX_CLEANUP_INTERVAL_MINUTES;
use crate::service::tracking::now_millis;
use crate::storage::Storage;

pub struct CleanupSweeper {
    storage: Arc<dyn Storage>,
    interval: Duration,
}

impl CleanupSweeper {
    pub fn new(storage: Arc<dyn Storage>, interval: Duration) -> Self {
        Self { storage, interval }
    }

    pub fn from_minutes(storage: Arc<dyn Storage>, minutes: u64) -> Self {
        Self::new(storage, Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Delete every pixel with `expires_at <= now`.
    ///
    /// Individual deletion failures are logged and skipped; only failing to
    /// list pixels is an error. Returns the number of pixels deleted.
    pub async fn sweep_once(&self, now: i64) -> Result<usize> {
        let pixels = self
            .storage
            .list_pixels()
            .await
            .context("Failed to list pixels for cleanup")?;

        let mut deleted_count = 0;

        for pixel in pixels.iter().filter(|p| p.expires_at <= now) {
            match self.storage.delete_pixel(&pixel.id).await {
                Ok(true) => {
                    deleted_count += 1;
                    info!(pixel_id = %pixel.id, "deleted expired pixel");
                }
                // Already gone, e.g. deleted through the API mid-sweep
                Ok(false) => {}
                Err(e) => {
                    warn!(pixel_id = %pixel.id, error = %e, "failed to delete expired pixel");
                }
            }
        }

        if deleted_count > 0 {
            info!("Cleanup complete: {} expired pixel(s) deleted", deleted_count);
        }

        Ok(deleted_count)
    }

    /// Interval clamped to what `tokio::time` can schedule
    fn tick_period(&self) -> Duration {
        self.interval.clamp(
            Duration::from_millis(1),
            Duration::from_secs(MAX_CLEANUP_INTERVAL_MINUTES * 60),
        )
    }

    /// Spawn the repeating sweep task.
    ///
    /// The first sweep runs immediately, then once per interval until
    /// [`CleanupHandle::stop`] is called.
    pub fn start(self) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            "Starting pixel cleanup service (runs every {} minutes)",
            self.interval.as_secs() / 60
        );

        let task = tokio::spawn(async move {
            let mut interval = time::interval(self.tick_period());
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep_once(now_millis()).await {
                            error!("Pixel cleanup failed: {:#}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Pixel cleanup service stopped");
                            break;
                        }
                    }
                }
            }
        });

        CleanupHandle { shutdown_tx, task }
    }
}

/// Handle to a running [`CleanupSweeper`]
pub struct CleanupHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CleanupHandle {
    /// Signal the sweeper to stop and wait for its task to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Pixel cleanup task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
