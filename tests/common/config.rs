//! Test configuration helpers for creating downloaders on temp directories

use chapter_dl::{ChapterDownloader, Config, PatternPageResolver};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Config storing everything under `root`, with fast retries
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.request_timeout = Duration::from_secs(5);
    config.download.retry.max_attempts = 2;
    config.download.retry.initial_delay = Duration::from_millis(10);
    config.download.retry.jitter = false;
    config.persistence.database_path = root.join("chapter-dl.db");
    config
}

/// Downloader using the pattern resolver, rooted at `root`
pub async fn open_downloader(root: &Path) -> ChapterDownloader {
    let config = test_config(root);
    let resolver = Arc::new(
        PatternPageResolver::new(&config.download).expect("Failed to create resolver"),
    );
    ChapterDownloader::new(config, resolver)
        .await
        .expect("Failed to create downloader")
}

/// Downloader on a fresh temp dir. Returns the tempdir (which must be kept alive).
pub async fn create_test_downloader() -> (ChapterDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let downloader = open_downloader(temp_dir.path()).await;
    (downloader, temp_dir)
}
