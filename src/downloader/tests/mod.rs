mod lifecycle;
mod queue;

use super::test_helpers::request;
use super::ChapterDownloader;
use crate::types::{ChapterId, Status};
use std::time::Duration;

/// Wait until `id` is downloaded or has failed
async fn wait_for_outcome(downloader: &ChapterDownloader, id: &str) -> Status {
    let id = ChapterId::new(id);
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if downloader.is_downloaded(&id).await.unwrap() {
                return Status::Done;
            }
            if let Some(item) = downloader.queue_item(&id).await.unwrap()
                && item.status == Status::Failed
            {
                return Status::Failed;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("chapter did not settle in time")
}

/// Request a chapter and wait for it to settle
async fn download(downloader: &ChapterDownloader, parent: &str, id: &str) -> Status {
    downloader.request_download(request(parent, id)).await.unwrap();
    wait_for_outcome(downloader, id).await
}
