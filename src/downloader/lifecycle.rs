//! Background wake-ups and shutdown coordination.

use crate::error::Result;
use crate::types::AppState;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::ChapterDownloader;

/// How long shutdown waits for the running chapter to finish
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ChapterDownloader {
    /// Start periodic background wake-ups
    ///
    /// Each wake resets interrupted items and drains the queue; the first
    /// one runs right away, picking up chapters a killed process left
    /// active. Returns `false` if wake-ups are already running or the
    /// downloader was shut down.
    pub fn start_background(&self) -> bool {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return false;
        }

        let started = self.scheduler.start();
        if started {
            tracing::info!(
                interval_secs = self.scheduler.interval().as_secs(),
                "Background wake-ups enabled"
            );
        }
        started
    }

    /// Report a host lifecycle change
    ///
    /// Coming back to the foreground drains the queue; the returned handle
    /// completes when that drain ends.
    pub fn notify_app_state(&self, state: AppState) -> Option<JoinHandle<()>> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return None;
        }
        self.scheduler.notify_app_state(state)
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Rejects new download requests
    /// 2. Stops background wake-ups
    /// 3. Waits for the running chapter drain to finish (30 second timeout)
    /// 4. Releases the drain lease and marks a clean shutdown in the database
    ///
    /// A drain still running after the timeout keeps its item `active`; the
    /// next wake-up after restart picks it up again.
    ///
    /// # Errors
    ///
    /// Returns an error if database operations fail during shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new downloads
        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        // 2. Stop periodic wake-ups
        self.scheduler.stop().await;

        // 3. Wait for the in-process drain with timeout
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_idle_worker()).await {
            Ok(()) => tracing::info!("Worker idle"),
            Err(_) => {
                tracing::warn!("Timeout waiting for the running drain, proceeding with shutdown")
            }
        }

        // 4. Release the lease so another process is not kept waiting
        if let Err(e) = self.worker.release_lease().await {
            tracing::error!(error = %e, "Failed to release drain lease during shutdown");
        }

        self.db.set_clean_shutdown().await?;
        tracing::info!("Marked clean shutdown in database");

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_idle_worker(&self) {
        while self.worker.is_busy() {
            tracing::debug!("Waiting for running drain to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
