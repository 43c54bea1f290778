//! # chapter-dl
//!
//! Crash-safe offline download engine for paginated chapter content.
//!
//! ## Design Philosophy
//!
//! chapter-dl is designed to be:
//! - **Crash-safe** - Queue, resume state and library live in one SQLite file;
//!   a killed process picks up where it stopped
//! - **Resumable** - Page transfers continue from the bytes already on disk
//! - **Library-first** - No UI, purely a Rust crate for embedding in a reader app
//! - **Event-driven** - Consumers subscribe to progress, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use chapter_dl::{ChapterDownloader, Config, DownloadRequest, PatternPageResolver};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let resolver = Arc::new(PatternPageResolver::new(&config.download)?);
//!     let downloader = ChapterDownloader::new(config, resolver).await?;
//!
//!     let request = DownloadRequest::new(
//!         "https://reader.example/manga/foo/chapter-1",
//!         "https://reader.example/manga/foo",
//!         "Foo",
//!         "https://reader.example/covers/foo.jpg",
//!         "Chapter 1",
//!     );
//!
//!     // Subscribe to progress
//!     let _subscription = downloader.subscribe(request.id.clone(), |progress, status| {
//!         println!("{:>3.0}% {}", progress * 100.0, status);
//!     });
//!
//!     downloader.request_download(request).await?;
//!     downloader.start_background();
//!
//!     // ...
//!     downloader.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Downloader facade (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Progress publish/subscribe
pub mod progress;
/// Chapter page resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Periodic and foreground wake-ups
pub mod scheduler;
/// Resumable page transfers
pub mod transfer;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;
/// Queue drainer
pub mod worker;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, PersistenceConfig, RetryConfig, SchedulerConfig};
pub use db::Database;
pub use downloader::ChapterDownloader;
pub use error::{DatabaseError, DownloadError, Error, Result};
pub use progress::{ProgressBus, Subscription};
pub use resolver::{PageResolver, PatternPageResolver};
pub use scheduler::BackgroundScheduler;
pub use transfer::{HttpTransferEngine, ResumeSnapshot, TransferEngine};
pub use types::{
    AppState, ChapterId, DownloadRequest, IndexEntry, ParentGroup, ProgressUpdate, Status,
    WorkItem, WorkItemPatch,
};
pub use worker::{DrainOutcome, DrainReport, WorkerLoop};
