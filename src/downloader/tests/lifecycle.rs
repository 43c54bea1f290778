use super::*;
use crate::downloader::test_helpers::create_test_downloader;
use crate::error::Error;
use crate::types::AppState;

#[tokio::test]
async fn shutdown_marks_clean_and_rejects_requests() {
    let t = create_test_downloader().await;
    t.downloader.db.set_clean_start().await.unwrap();
    assert!(t.downloader.start_background());

    t.downloader.shutdown().await.unwrap();

    assert!(!t.downloader.db.was_unclean_shutdown().await.unwrap());
    let result = t.downloader.request_download(request("m1", "ch1")).await;
    assert!(matches!(result, Err(Error::ShuttingDown)));
    assert!(!t.downloader.start_background());
    assert!(t.downloader.notify_app_state(AppState::Background).is_none());
}

#[tokio::test]
async fn shutdown_waits_for_running_drain() {
    let t = create_test_downloader().await;
    t.engine.set_delay(Duration::from_millis(50));
    t.resolver.set_pages("ch1", &["https://c/1.jpg", "https://c/2.jpg"]);
    t.downloader.request_download(request("m1", "ch1")).await.unwrap();

    while !t.downloader.worker.is_busy() {
        tokio::task::yield_now().await;
    }
    t.downloader.shutdown().await.unwrap();

    assert!(t.downloader.is_downloaded(&ChapterId::new("ch1")).await.unwrap());
    // The lease was released, so another owner can take it immediately
    assert!(
        t.downloader
            .db
            .try_acquire_drain_lease("next-process", Duration::from_secs(60))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn returning_to_foreground_drains_queue() {
    let t = create_test_downloader().await;
    t.resolver.set_pages("ch1", &["https://c/1.jpg"]);
    t.downloader.db.enqueue(&request("m1", "ch1")).await.unwrap();

    assert!(t.downloader.notify_app_state(AppState::Background).is_none());
    let drain = t.downloader.notify_app_state(AppState::Active).unwrap();
    drain.await.unwrap();

    assert!(t.downloader.is_downloaded(&ChapterId::new("ch1")).await.unwrap());
}
