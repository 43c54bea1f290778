//! Core downloader implementation split into focused submodules.
//!
//! The `ChapterDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Download requests, retries and queue inspection
//! - [`library`] - Downloaded chapter queries and deletion
//! - [`lifecycle`] - Background wake-ups and shutdown coordination

mod library;
mod lifecycle;
mod queue;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::progress::{ProgressBus, Subscription};
use crate::resolver::PageResolver;
use crate::scheduler::BackgroundScheduler;
use crate::transfer::{HttpTransferEngine, TransferEngine};
use crate::types::{ChapterId, ProgressUpdate, Status};
use crate::worker::WorkerLoop;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChapterDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query queue and index state
    pub db: Arc<Database>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Progress listeners
    pub(crate) bus: ProgressBus,
    /// Single-flight queue drainer
    pub(crate) worker: Arc<WorkerLoop>,
    /// Periodic and foreground wake-ups
    pub(crate) scheduler: Arc<BackgroundScheduler>,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl ChapterDownloader {
    /// Create a new ChapterDownloader instance
    ///
    /// This initializes all core components:
    /// - Creates the download directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Builds the HTTP transfer engine from the download configuration
    ///
    /// Nothing is drained until a download is requested, [`drain_now`] is
    /// called, or background wake-ups are started with [`start_background`].
    ///
    /// [`drain_now`]: Self::drain_now
    /// [`start_background`]: Self::start_background
    pub async fn new(config: Config, resolver: Arc<dyn PageResolver>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let db = Database::new(&config.persistence.database_path).await?;

        if db.was_unclean_shutdown().await? {
            tracing::warn!(
                "Previous session did not shut down cleanly, interrupted downloads resume on the next wake-up"
            );
        }

        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        let engine = Arc::new(HttpTransferEngine::new(&config.download)?);

        Ok(Self::with_components(config, Arc::new(db), resolver, engine))
    }

    /// Assemble a downloader from already-built parts
    ///
    /// Useful for custom transfer engines; does not touch runtime state.
    pub fn with_components(
        config: Config,
        db: Arc<Database>,
        resolver: Arc<dyn PageResolver>,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        let bus = ProgressBus::new();
        let worker = Arc::new(WorkerLoop::new(
            Arc::clone(&db),
            resolver,
            engine,
            bus.clone(),
            config.download.download_dir.clone(),
            config.scheduler.drain_lease,
        ));
        let scheduler = Arc::new(BackgroundScheduler::new(
            Arc::clone(&worker),
            &config.scheduler,
        ));

        Self {
            db,
            config: Arc::new(config),
            bus,
            worker,
            scheduler,
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register a progress callback for one chapter
    ///
    /// The callback receives `(progress, status)` synchronously from the
    /// worker. Dropping the returned [`Subscription`] unsubscribes.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, id: ChapterId, callback: F) -> Subscription
    where
        F: Fn(f32, Status) + Send + Sync + 'static,
    {
        self.bus.subscribe(id, callback)
    }

    /// Broadcast receiver of progress updates for one chapter
    pub fn watch(&self, id: &ChapterId) -> tokio::sync::broadcast::Receiver<ProgressUpdate> {
        self.bus.watch(id)
    }

    /// Broadcast receiver of progress updates for every chapter
    ///
    /// Events are buffered, but a subscriber that falls behind by more than
    /// 1000 events receives a `RecvError::Lagged` error.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<ProgressUpdate> {
        self.bus.events()
    }

    /// The progress bus shared with the worker
    pub fn progress(&self) -> &ProgressBus {
        &self.bus
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}
