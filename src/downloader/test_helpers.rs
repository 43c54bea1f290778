//! Shared test helpers: temporary databases, fake collaborators and a
//! ready-made ChapterDownloader.

use crate::config::Config;
use crate::db::Database;
use crate::downloader::ChapterDownloader;
use crate::error::{DownloadError, Error};
use crate::resolver::PageResolver;
use crate::transfer::{ResumeSnapshot, SnapshotSink, TransferEngine};
use crate::types::{ChapterId, DownloadRequest};
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

/// Fresh database in a temp dir. Returns the tempdir (which must be kept alive).
pub(crate) async fn temp_database() -> (Arc<Database>, TempDir) {
    let temp_dir = tempdir().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db"))
        .await
        .unwrap();
    (Arc::new(db), temp_dir)
}

/// Download request for chapter `id` of parent `parent`
pub(crate) fn request(parent: &str, id: &str) -> DownloadRequest {
    DownloadRequest::new(
        id,
        parent,
        format!("Title of {}", parent),
        format!("https://img.example/{}.jpg", parent),
        format!("Chapter {}", id),
    )
}

/// Resolver answering from an in-memory table
///
/// Unknown chapters resolve to an empty page list.
#[derive(Default)]
pub(crate) struct FakeResolver {
    pages: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub(crate) fn set_pages(&self, id: &str, pages: &[&str]) {
        self.pages.lock().unwrap().insert(
            id.to_string(),
            pages.iter().map(|p| p.to_string()).collect(),
        );
    }

    pub(crate) fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageResolver for FakeResolver {
    async fn resolve_pages(&self, chapter: &ChapterId) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(chapter.as_str()) {
            return Err(Error::Other("offline".to_string()));
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(chapter.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// Transfer engine that writes the address as the file body
#[derive(Default)]
pub(crate) struct FakeTransferEngine {
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    fetched: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransferEngine {
    pub(crate) fn fail_address(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Addresses actually transferred, in order
    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferEngine for FakeTransferEngine {
    async fn prepare(
        &self,
        address: &str,
        _local: &Path,
        _previous: Option<&str>,
    ) -> Result<String> {
        ResumeSnapshot::fresh(address).encode()
    }

    async fn fetch_bytes(
        &self,
        address: &str,
        local: &Path,
        _resume: Option<&str>,
        _sink: &dyn SnapshotSink,
    ) -> Result<PathBuf> {
        if local.exists() {
            return Ok(local.to_path_buf());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing.lock().unwrap().contains(address);
        let result = if failing {
            Err(DownloadError::TransferFailed {
                address: address.to_string(),
                reason: "HTTP 404".to_string(),
                status: Some(404),
            }
            .into())
        } else {
            self.fetched.lock().unwrap().push(address.to_string());
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(local, address.as_bytes()).await.unwrap();
            Ok(local.to_path_buf())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Test downloader wired to fake collaborators
pub(crate) struct TestDownloader {
    pub(crate) downloader: ChapterDownloader,
    pub(crate) resolver: Arc<FakeResolver>,
    pub(crate) engine: Arc<FakeTransferEngine>,
    pub(crate) temp_dir: TempDir,
}

/// Helper to create a test ChapterDownloader instance with a persistent database.
pub(crate) async fn create_test_downloader() -> TestDownloader {
    let (db, temp_dir) = temp_database().await;

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("test.db");
    config.download.download_dir = temp_dir.path().join("downloads");
    std::fs::create_dir_all(&config.download.download_dir).unwrap();

    let resolver = Arc::new(FakeResolver::default());
    let engine = Arc::new(FakeTransferEngine::default());
    let downloader =
        ChapterDownloader::with_components(config, db, resolver.clone(), engine.clone());

    TestDownloader {
        downloader,
        resolver,
        engine,
        temp_dir,
    }
}
