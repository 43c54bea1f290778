//! Waiting helpers for background drains

use chapter_dl::{ChapterDownloader, ChapterId, Status};
use std::time::Duration;

/// Wait until `id` is downloaded or has failed, up to `timeout`
pub async fn wait_for_outcome(
    downloader: &ChapterDownloader,
    id: &ChapterId,
    timeout: Duration,
) -> Result<Status, String> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if downloader
            .is_downloaded(id)
            .await
            .map_err(|e| e.to_string())?
        {
            return Ok(Status::Done);
        }
        if let Some(item) = downloader.queue_item(id).await.map_err(|e| e.to_string())?
            && item.status == Status::Failed
        {
            return Ok(Status::Failed);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("chapter {} did not settle within {:?}", id, timeout));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
