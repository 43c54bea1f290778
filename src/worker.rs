//! Single-flight queue drainer
//!
//! [`WorkerLoop`] turns queue items into index entries, one chapter at a time
//! and one page at a time:
//!
//! ```text
//! pending ──▶ active ──▶ done (folded into the index, removed from the queue)
//!                  └───▶ failed (kept with its error until a fresh enqueue)
//! ```
//!
//! `active → pending` only happens through [`WorkerLoop::recover_and_drain`],
//! which resets interrupted items inside the busy guard so it can never touch
//! the item a running drain is working on.
//!
//! Two guards keep drains exclusive: a per-process mutex, and a lease row in
//! the database so a second process sharing the same file backs off.

use crate::db::Database;
use crate::error::{DownloadError, Error};
use crate::progress::ProgressBus;
use crate::resolver::PageResolver;
use crate::transfer::TransferEngine;
use crate::types::{ChapterId, IndexEntry, Status, WorkItem, WorkItemPatch};
use crate::utils::{chapter_dir, page_path};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Result of one drain request
#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    /// This call drained the queue
    Completed(DrainReport),
    /// Another drain (in this or another process) is already running
    AlreadyRunning,
}

/// What one drain did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Chapters folded into the index, in processing order
    pub completed: Vec<ChapterId>,
    /// Chapters marked failed, in processing order
    pub failed: Vec<ChapterId>,
    /// Interrupted items returned to pending before draining
    pub recovered: u64,
}

/// Sequential, single-flight drainer of the work queue
pub struct WorkerLoop {
    db: Arc<Database>,
    resolver: Arc<dyn PageResolver>,
    engine: Arc<dyn TransferEngine>,
    bus: ProgressBus,
    download_dir: PathBuf,
    lease_ttl: Duration,
    owner: String,
    busy: tokio::sync::Mutex<()>,
    wanted: AtomicBool,
    recover_wanted: AtomicBool,
}

impl WorkerLoop {
    /// Create a worker writing artifacts under `download_dir`
    pub fn new(
        db: Arc<Database>,
        resolver: Arc<dyn PageResolver>,
        engine: Arc<dyn TransferEngine>,
        bus: ProgressBus,
        download_dir: PathBuf,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            db,
            resolver,
            engine,
            bus,
            download_dir,
            lease_ttl,
            owner: format!("{}-{:016x}", std::process::id(), rand::random::<u64>()),
            busy: tokio::sync::Mutex::new(()),
            wanted: AtomicBool::new(false),
            recover_wanted: AtomicBool::new(false),
        }
    }

    /// Whether a drain is running in this process
    pub fn is_busy(&self) -> bool {
        self.busy.try_lock().is_err()
    }

    /// Drain every pending item, or return immediately if a drain is running
    pub async fn drain(&self) -> Result<DrainOutcome> {
        self.guarded(false).await
    }

    /// Reset interrupted items to pending, then drain
    ///
    /// Used by wake-ups: items left `active` by a killed process are picked up
    /// again. Failed items are not touched.
    pub async fn recover_and_drain(&self) -> Result<DrainOutcome> {
        self.guarded(true).await
    }

    /// Give up the drain lease held by this worker, if any
    ///
    /// Needed after a drain future was dropped mid-way, which skips the
    /// normal release.
    pub async fn release_lease(&self) -> Result<()> {
        self.db.release_drain_lease(&self.owner).await
    }

    async fn guarded(&self, recover: bool) -> Result<DrainOutcome> {
        // Raised before the guard is tried, consumed only while holding it:
        // a trigger that loses the race is picked up by the holder's next round.
        if recover {
            self.recover_wanted.store(true, Ordering::SeqCst);
        }
        self.wanted.store(true, Ordering::SeqCst);
        let mut merged: Option<DrainReport> = None;

        loop {
            let Ok(busy) = self.busy.try_lock() else {
                tracing::debug!("Drain already running, trigger handed over");
                break;
            };
            if !self.wanted.swap(false, Ordering::SeqCst) {
                break;
            }
            let recover = self.recover_wanted.swap(false, Ordering::SeqCst);

            if !self
                .db
                .try_acquire_drain_lease(&self.owner, self.lease_ttl)
                .await?
            {
                tracing::info!("Another process holds the drain lease, skipping drain");
                break;
            }

            let result = self.drain_with_lease(recover).await;

            if let Err(e) = self.db.release_drain_lease(&self.owner).await {
                tracing::warn!(error = %e, "Failed to release drain lease");
            }
            drop(busy);

            let round = result?;
            let report = merged.get_or_insert_with(DrainReport::default);
            report.recovered += round.recovered;
            report.completed.extend(round.completed);
            report.failed.extend(round.failed);
        }

        Ok(merged.map_or(DrainOutcome::AlreadyRunning, DrainOutcome::Completed))
    }

    async fn drain_with_lease(&self, recover: bool) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        if recover {
            report.recovered = self.db.reset_interrupted().await?;
        }

        while let Some(mut item) = self.db.next_pending().await? {
            let id = item.id.clone();

            let mut start = WorkItemPatch::status(Status::Active);
            let on_disk = self.pages_on_disk(&item).await;
            if on_disk < item.pages_completed {
                tracing::warn!(
                    chapter = %id,
                    recorded = item.pages_completed,
                    on_disk,
                    "Completed pages missing from disk, resuming from the first gap"
                );
                start.pages_completed = Some(on_disk);
                item.pages_completed = on_disk;
            }

            if let Err(e) = self.db.patch_queue_item(&id, start).await {
                tracing::error!(chapter = %id, error = %e, "Failed to mark chapter active");
                self.mark_failed(&id, &e).await?;
                report.failed.push(id);
                continue;
            }
            self.bus.publish(&id, item.progress(), Status::Active);
            tracing::info!(chapter = %id, label = %item.label, "Starting chapter download");

            match self.process_item(&item).await {
                Ok(Some(entry)) => {
                    self.bus.publish(&id, 1.0, Status::Done);
                    tracing::info!(
                        chapter = %id,
                        label = %entry.label,
                        pages = entry.page_count,
                        "Chapter download complete"
                    );
                    report.completed.push(id);
                }
                Ok(None) => {
                    tracing::warn!(chapter = %id, "Drain lease lost, stopping drain");
                    self.db
                        .patch_queue_item(&id, WorkItemPatch::status(Status::Pending))
                        .await?;
                    self.wanted.store(false, Ordering::SeqCst);
                    break;
                }
                Err(e) => {
                    tracing::error!(chapter = %id, error = %e, "Chapter download failed");
                    self.mark_failed(&id, &e).await?;
                    report.failed.push(id);
                }
            }
        }

        tracing::debug!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Queue drained"
        );
        Ok(report)
    }

    /// Record a failed attempt and publish its last known progress
    ///
    /// An error here ends the drain, since the item would otherwise be
    /// picked again as still pending.
    async fn mark_failed(&self, id: &ChapterId, error: &Error) -> Result<()> {
        let updated = self
            .db
            .patch_queue_item(id, WorkItemPatch::failed(failure_message(error)))
            .await?;
        let progress = updated.map_or(0.0, |item| item.progress());
        self.bus.publish(id, progress, Status::Failed);
        Ok(())
    }

    /// Number of leading recorded pages whose artifacts still exist
    async fn pages_on_disk(&self, item: &WorkItem) -> usize {
        let dir = chapter_dir(&self.download_dir, &item.parent_id, item.id.as_str());
        let recorded = item.page_addresses.iter().take(item.pages_completed);
        for (index, address) in recorded.enumerate() {
            let path = page_path(&dir, index, address);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return index;
            }
        }
        item.pages_completed
    }

    /// Resolve, transfer and commit one item
    ///
    /// Returns `None` if the drain lease was lost part-way.
    async fn process_item(&self, item: &WorkItem) -> Result<Option<IndexEntry>> {
        let id = &item.id;

        let pages = if item.page_addresses.is_empty() {
            let pages = self
                .resolver
                .resolve_pages(id)
                .await
                .map_err(|e| as_resolution_failure(id, e))?;
            if pages.is_empty() {
                return Err(DownloadError::NoPagesFound.into());
            }
            self.db
                .patch_queue_item(id, WorkItemPatch::page_addresses(pages.clone()))
                .await?;
            pages
        } else {
            item.page_addresses.clone()
        };

        let dir = chapter_dir(&self.download_dir, &item.parent_id, id.as_str());
        let artifacts: Vec<PathBuf> = pages
            .iter()
            .enumerate()
            .map(|(index, address)| page_path(&dir, index, address))
            .collect();
        let total = pages.len();
        let start = item.pages_completed.min(total);

        if start > 0 {
            tracing::info!(chapter = %id, start, total, "Resuming chapter download");
        }

        for index in start..total {
            let address = &pages[index];
            let local = &artifacts[index];

            let previous = self.db.get_snapshot(local).await?;
            let snapshot = self
                .engine
                .prepare(address, local, previous.as_deref())
                .await?;
            self.db.put_snapshot(local, &snapshot).await?;

            self.engine
                .fetch_bytes(address, local, Some(&snapshot), self.db.as_ref())
                .await?;

            self.db.clear_snapshot(local).await?;
            self.db
                .patch_queue_item(id, WorkItemPatch::pages_completed(index + 1))
                .await?;
            self.bus
                .publish(id, (index + 1) as f32 / total as f32, Status::Active);

            if !self
                .db
                .try_acquire_drain_lease(&self.owner, self.lease_ttl)
                .await?
            {
                return Ok(None);
            }
        }

        let entry = IndexEntry::from_completed(item, artifacts);
        self.db.commit_completed(&entry).await?;
        Ok(Some(entry))
    }
}

/// Resolver errors other than the download taxonomy become `SourceUnavailable`
fn as_resolution_failure(id: &ChapterId, error: Error) -> Error {
    match error {
        Error::Download(_) => error,
        other => DownloadError::SourceUnavailable {
            chapter: id.to_string(),
            reason: other.to_string(),
        }
        .into(),
    }
}

/// Message stored on a failed item
fn failure_message(error: &Error) -> String {
    match error {
        Error::Download(e) => e.to_string(),
        other => other.to_string(),
    }
}
