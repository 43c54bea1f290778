use super::*;
use crate::downloader::test_helpers::create_test_downloader;
use crate::error::{DownloadError, Error};
use crate::types::WorkItemPatch;
use crate::utils::chapter_dir;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn three_page_chapter_lands_in_library() {
    let t = create_test_downloader().await;
    t.resolver
        .set_pages("ch1", &["https://c/1.jpg", "https://c/2.jpg", "https://c/3.jpg"]);

    assert_eq!(download(&t.downloader, "m1", "ch1").await, Status::Done);

    let id = ChapterId::new("ch1");
    let entry = t.downloader.get(&id).await.unwrap().unwrap();
    assert_eq!(entry.page_count, 3);
    assert_eq!(entry.page_count, entry.local_artifacts.len());
    assert_eq!(entry.parent_title, "Title of m1");
    assert!(t.downloader.queue_item(&id).await.unwrap().is_none());
    assert_eq!(t.downloader.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_requests_keep_one_item() {
    let t = create_test_downloader().await;
    t.engine.set_delay(Duration::from_millis(30));
    t.resolver.set_pages("ch1", &["https://c/1.jpg", "https://c/2.jpg"]);

    assert!(t.downloader.request_download(request("m1", "ch1")).await.unwrap());
    assert!(!t.downloader.request_download(request("m1", "ch1")).await.unwrap());
    assert!(!t.downloader.request_download(request("m1", "ch1")).await.unwrap());

    let queue = t.downloader.queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert!(queue[0].status.is_in_flight());

    assert_eq!(wait_for_outcome(&t.downloader, "ch1").await, Status::Done);
    assert_eq!(t.engine.fetched().len(), 2, "each page fetched once");
    assert_eq!(t.downloader.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn progress_is_monotonic_until_done() {
    let t = create_test_downloader().await;
    t.resolver.set_pages(
        "ch1",
        &["https://c/1.jpg", "https://c/2.jpg", "https://c/3.jpg", "https://c/4.jpg"],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = t.downloader.subscribe(ChapterId::new("ch1"), move |p, s| {
        sink.lock().unwrap().push((p, s));
    });

    assert_eq!(download(&t.downloader, "m1", "ch1").await, Status::Done);
    // Done is published after the index write the wait loop observes
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0), "{:?}", seen);
    assert_eq!(seen.last().unwrap(), &(1.0, Status::Done));
}

#[tokio::test]
async fn retry_requeues_failed_chapter() {
    let t = create_test_downloader().await;
    t.resolver.set_pages("ch1", &[]);

    assert_eq!(download(&t.downloader, "m1", "ch1").await, Status::Failed);
    let failed = t.downloader.queue_item(&ChapterId::new("ch1")).await.unwrap().unwrap();
    assert_eq!(failed.last_error.as_deref(), Some("No pages found"));

    t.resolver.set_pages("ch1", &["https://c/1.jpg"]);
    t.downloader.retry(&ChapterId::new("ch1")).await.unwrap();

    assert_eq!(wait_for_outcome(&t.downloader, "ch1").await, Status::Done);
    let entry = t.downloader.get(&ChapterId::new("ch1")).await.unwrap().unwrap();
    assert_eq!(entry.label, "Chapter ch1");
}

#[tokio::test]
async fn retry_requires_failed_item() {
    let t = create_test_downloader().await;

    let missing = t.downloader.retry(&ChapterId::new("nope")).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    // Enqueue without triggering a drain
    t.downloader.db.enqueue(&request("m1", "ch1")).await.unwrap();
    let pending = t.downloader.retry(&ChapterId::new("ch1")).await;
    assert!(matches!(
        pending,
        Err(Error::Download(DownloadError::InvalidState { ref operation, .. })) if operation == "retry"
    ));
}

#[tokio::test]
async fn remove_from_queue_discards_partial_pages() {
    let t = create_test_downloader().await;
    t.resolver.set_pages("ch1", &["https://c/1.jpg", "https://c/bad.jpg"]);
    t.engine.fail_address("https://c/bad.jpg");

    assert_eq!(download(&t.downloader, "m1", "ch1").await, Status::Failed);
    let dir = chapter_dir(t.downloader.config.download_dir(), "m1", "ch1");
    assert!(dir.join("page_0000.jpg").exists());

    assert!(t.downloader.remove_from_queue(&ChapterId::new("ch1")).await.unwrap());
    assert!(!dir.exists());
    assert!(t.downloader.queue().await.unwrap().is_empty());
    assert!(!t.downloader.remove_from_queue(&ChapterId::new("ch1")).await.unwrap());
}

#[tokio::test]
async fn remove_from_queue_refuses_active_item() {
    let t = create_test_downloader().await;
    let id = ChapterId::new("ch1");
    t.downloader.db.enqueue(&request("m1", "ch1")).await.unwrap();
    t.downloader
        .db
        .patch_queue_item(&id, WorkItemPatch::status(Status::Active))
        .await
        .unwrap();

    let result = t.downloader.remove_from_queue(&id).await;
    assert!(matches!(
        result,
        Err(Error::Download(DownloadError::InvalidState { .. }))
    ));
    assert!(t.downloader.queue_item(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn drain_now_reports_processed_chapters() {
    let t = create_test_downloader().await;
    t.resolver.set_pages("ch1", &["https://c/1.jpg"]);
    t.resolver.set_pages("ch2", &[]);
    t.downloader.db.enqueue(&request("m1", "ch1")).await.unwrap();
    t.downloader.db.enqueue(&request("m1", "ch2")).await.unwrap();

    match t.downloader.drain_now().await.unwrap() {
        crate::worker::DrainOutcome::Completed(report) => {
            assert_eq!(report.completed, vec![ChapterId::new("ch1")]);
            assert_eq!(report.failed, vec![ChapterId::new("ch2")]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
