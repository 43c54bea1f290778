use super::request;
use crate::db::*;
use crate::types::{ChapterId, Status, WorkItemPatch};
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_enqueue_appends_in_order() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.enqueue(&request("ch1")).await.unwrap());
    assert!(db.enqueue(&request("ch2")).await.unwrap());

    let queue = db.load_queue().await.unwrap();
    let ids: Vec<_> = queue.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["ch1", "ch2"]);
    assert!(queue.iter().all(|i| i.status == Status::Pending));
    assert!(queue.iter().all(|i| i.page_addresses.is_empty()));

    db.close().await;
}

#[tokio::test]
async fn test_enqueue_is_idempotent_while_in_flight() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.enqueue(&request("ch1")).await.unwrap());
    assert!(!db.enqueue(&request("ch1")).await.unwrap());

    db.patch_queue_item(&ChapterId::new("ch1"), WorkItemPatch::status(Status::Active))
        .await
        .unwrap();
    assert!(!db.enqueue(&request("ch1")).await.unwrap());

    assert_eq!(db.load_queue().await.unwrap().len(), 1);

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_patches_and_enqueues_all_succeed() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = std::sync::Arc::new(Database::new(temp_file.path()).await.unwrap());
    for n in 0..10 {
        db.enqueue(&request(&format!("ch{}", n))).await.unwrap();
    }

    let mut tasks = Vec::new();
    for n in 0..10 {
        let db = std::sync::Arc::clone(&db);
        tasks.push(tokio::spawn(async move {
            let id = ChapterId::new(format!("ch{}", n));
            let start = WorkItemPatch {
                status: Some(Status::Active),
                page_addresses: Some(vec!["a".into(), "b".into(), "c".into()]),
                ..Default::default()
            };
            db.patch_queue_item(&id, start).await?;
            for page in 1..=3 {
                db.patch_queue_item(&id, WorkItemPatch::pages_completed(page)).await?;
            }
            Ok::<_, crate::Error>(())
        }));
    }
    for n in 0..100 {
        let db = std::sync::Arc::clone(&db);
        tasks.push(tokio::spawn(async move {
            db.enqueue(&request(&format!("extra{}", n))).await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let queue = db.load_queue().await.unwrap();
    assert_eq!(queue.len(), 110);
    assert!(
        queue
            .iter()
            .filter(|i| i.id.as_str().starts_with("ch"))
            .all(|i| i.status == Status::Active && i.pages_completed == 3)
    );
}

#[tokio::test]
async fn test_enqueue_replaces_failed_item_at_the_back() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue(&request("ch1")).await.unwrap();
    db.enqueue(&request("ch2")).await.unwrap();
    db.patch_queue_item(
        &ChapterId::new("ch1"),
        WorkItemPatch {
            status: Some(Status::Failed),
            page_addresses: Some(vec!["https://cdn/1.jpg".into()]),
            last_error: Some("No pages found".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(db.enqueue(&request("ch1")).await.unwrap());

    let queue = db.load_queue().await.unwrap();
    let ids: Vec<_> = queue.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["ch2", "ch1"]);

    let fresh = &queue[1];
    assert_eq!(fresh.status, Status::Pending);
    assert!(fresh.page_addresses.is_empty());
    assert!(fresh.last_error.is_none());

    db.close().await;
}

#[tokio::test]
async fn test_patch_merges_fields() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let id = ChapterId::new("ch1");

    db.enqueue(&request("ch1")).await.unwrap();
    db.patch_queue_item(
        &id,
        WorkItemPatch::page_addresses(vec!["a.jpg".into(), "b.jpg".into(), "c.jpg".into()]),
    )
    .await
    .unwrap();
    let item = db
        .patch_queue_item(&id, WorkItemPatch::pages_completed(2))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(item.page_addresses.len(), 3);
    assert_eq!(item.pages_completed, 2);
    assert_eq!(item.status, Status::Pending);

    let stored = db.get_queue_item(&id).await.unwrap().unwrap();
    assert_eq!(stored, item);

    db.close().await;
}

#[tokio::test]
async fn test_patch_missing_item_is_a_no_op() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let result = db
        .patch_queue_item(&ChapterId::new("ghost"), WorkItemPatch::status(Status::Active))
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(db.load_queue().await.unwrap().is_empty());

    db.close().await;
}

#[tokio::test]
async fn test_next_pending_skips_other_statuses() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue(&request("ch1")).await.unwrap();
    db.enqueue(&request("ch2")).await.unwrap();
    db.enqueue(&request("ch3")).await.unwrap();
    db.patch_queue_item(&ChapterId::new("ch1"), WorkItemPatch::failed("boom"))
        .await
        .unwrap();
    db.patch_queue_item(&ChapterId::new("ch2"), WorkItemPatch::status(Status::Active))
        .await
        .unwrap();

    let next = db.next_pending().await.unwrap().unwrap();
    assert_eq!(next.id, "ch3");

    let failed = db.list_queue_by_status(Status::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("boom"));

    db.close().await;
}

#[tokio::test]
async fn test_reset_interrupted_only_touches_active() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue(&request("ch1")).await.unwrap();
    db.enqueue(&request("ch2")).await.unwrap();
    db.enqueue(&request("ch3")).await.unwrap();
    db.patch_queue_item(&ChapterId::new("ch1"), WorkItemPatch::status(Status::Active))
        .await
        .unwrap();
    db.patch_queue_item(&ChapterId::new("ch2"), WorkItemPatch::failed("boom"))
        .await
        .unwrap();

    assert_eq!(db.reset_interrupted().await.unwrap(), 1);

    let statuses: Vec<_> = db
        .load_queue()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.status)
        .collect();
    assert_eq!(statuses, vec![Status::Pending, Status::Failed, Status::Pending]);

    assert_eq!(db.reset_interrupted().await.unwrap(), 0);

    db.close().await;
}

#[tokio::test]
async fn test_save_queue_replaces_everything() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue(&request("ch1")).await.unwrap();
    db.enqueue(&request("ch2")).await.unwrap();

    let mut items = db.load_queue().await.unwrap();
    items.reverse();
    items.pop();
    db.save_queue(&items).await.unwrap();

    let queue = db.load_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, "ch2");

    db.close().await;
}

#[tokio::test]
async fn test_remove_queue_item() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue(&request("ch1")).await.unwrap();
    assert!(db.remove_queue_item(&ChapterId::new("ch1")).await.unwrap());
    assert!(!db.remove_queue_item(&ChapterId::new("ch1")).await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_corrupt_page_addresses_degrade_to_unresolved() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.enqueue(&request("ch1")).await.unwrap();
    sqlx::query("UPDATE queue SET page_addresses = 'not json', pages_completed = 4 WHERE id = 'ch1'")
        .execute(db.pool())
        .await
        .unwrap();

    let item = db.get_queue_item(&ChapterId::new("ch1")).await.unwrap().unwrap();
    assert!(item.page_addresses.is_empty());
    assert_eq!(item.pages_completed, 0);

    db.close().await;
}
