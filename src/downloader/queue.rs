//! Download requests, retries and queue inspection.

use crate::error::{DownloadError, Error, Result};
use crate::types::{ChapterId, DownloadRequest, Status, WorkItem};
use crate::utils::chapter_dir;
use crate::worker::DrainOutcome;
use std::sync::atomic::Ordering;

use super::ChapterDownloader;

impl ChapterDownloader {
    /// Queue a chapter for offline reading and start draining in the background
    ///
    /// Requesting a chapter that is already pending or active is a no-op;
    /// a failed chapter is re-queued at the back. Returns `true` when a new
    /// queue item was created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) was called.
    pub async fn request_download(&self, request: DownloadRequest) -> Result<bool> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let queued = self.db.enqueue(&request).await?;
        self.spawn_drain();
        Ok(queued)
    }

    /// Re-queue a failed chapter using its stored metadata
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the chapter is not in the queue
    /// - [`DownloadError::InvalidState`] if the chapter has not failed
    pub async fn retry(&self, id: &ChapterId) -> Result<()> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let item = self
            .db
            .get_queue_item(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chapter {} is not queued", id)))?;

        if item.status != Status::Failed {
            return Err(DownloadError::InvalidState {
                id: id.to_string(),
                operation: "retry".to_string(),
                current_state: item.status.to_string(),
            }
            .into());
        }

        tracing::info!(chapter = %id, previous_error = ?item.last_error, "Retrying failed chapter");
        self.db.enqueue(&item.request()).await?;
        self.spawn_drain();
        Ok(())
    }

    /// Drop a pending or failed chapter from the queue
    ///
    /// Partial artifacts and resume snapshots of the chapter are discarded
    /// unless the chapter is also in the library. Returns `false` if the
    /// chapter was not queued.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] if the chapter is being downloaded.
    pub async fn remove_from_queue(&self, id: &ChapterId) -> Result<bool> {
        let Some(item) = self.db.get_queue_item(id).await? else {
            return Ok(false);
        };

        if item.status == Status::Active {
            return Err(DownloadError::InvalidState {
                id: id.to_string(),
                operation: "remove".to_string(),
                current_state: item.status.to_string(),
            }
            .into());
        }

        self.db.remove_queue_item(id).await?;

        let dir = chapter_dir(self.config.download_dir(), &item.parent_id, id.as_str());
        self.db.clear_snapshots_under(&dir).await?;
        if !self.db.is_downloaded(id).await? {
            crate::utils::remove_dir_if_exists(&dir).await?;
        }

        tracing::info!(chapter = %id, "Chapter removed from queue");
        Ok(true)
    }

    /// Current queue contents in processing order
    pub async fn queue(&self) -> Result<Vec<WorkItem>> {
        self.db.load_queue().await
    }

    /// Queue item of one chapter, if queued
    pub async fn queue_item(&self, id: &ChapterId) -> Result<Option<WorkItem>> {
        self.db.get_queue_item(id).await
    }

    /// Drain the queue on the current task and wait for it to finish
    ///
    /// Returns [`DrainOutcome::AlreadyRunning`] if a drain is in progress.
    pub async fn drain_now(&self) -> Result<DrainOutcome> {
        self.worker.drain().await
    }

    /// Return interrupted chapters to the queue, then drain it
    ///
    /// The same work a periodic wake-up does. Failed chapters stay failed.
    pub async fn recover_interrupted(&self) -> Result<DrainOutcome> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.worker.recover_and_drain().await
    }

    /// Kick a drain on a background task
    pub(crate) fn spawn_drain(&self) -> tokio::task::JoinHandle<()> {
        let worker = std::sync::Arc::clone(&self.worker);
        tokio::spawn(async move {
            match worker.drain().await {
                Ok(DrainOutcome::Completed(report)) => tracing::debug!(
                    completed = report.completed.len(),
                    failed = report.failed.len(),
                    "Background drain finished"
                ),
                Ok(DrainOutcome::AlreadyRunning) => {
                    tracing::debug!("Drain already running, request will be picked up")
                }
                Err(e) => tracing::error!(error = %e, "Background drain aborted"),
            }
        })
    }
}
