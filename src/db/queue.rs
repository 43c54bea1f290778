//! Work queue persistence (QueueStore).
//!
//! The queue holds at most one row per chapter id. Store order is insertion
//! order, so re-queuing a failed chapter moves it to the back.

use crate::error::query_failed;
use crate::types::{ChapterId, DownloadRequest, Status, WorkItem, WorkItemPatch};
use crate::Result;
use sqlx::SqliteConnection;

use super::{Database, QueueRow};

const QUEUE_COLUMNS: &str = "seq, id, parent_id, parent_title, parent_image, label, \
     page_addresses, pages_completed, status, created_at, last_error";

impl Database {
    /// Load every queue item in store order
    pub async fn load_queue(&self) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {} FROM queue ORDER BY seq ASC",
            QUEUE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to load queue"))?;

        Ok(rows.into_iter().map(WorkItem::from).collect())
    }

    /// Replace the whole queue with `items`, atomically
    pub async fn save_queue(&self, items: &[WorkItem]) -> Result<()> {
        let mut tx = self.begin_write("Failed to begin queue transaction").await?;

        sqlx::query("DELETE FROM queue")
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Failed to clear queue"))?;

        for item in items {
            insert_item(&mut tx, item).await?;
        }

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit queue"))?;

        Ok(())
    }

    /// Queue a chapter unless it is already pending or active
    ///
    /// A failed item with the same id is replaced by a fresh pending item.
    /// Returns `true` when a new item was queued.
    pub async fn enqueue(&self, request: &DownloadRequest) -> Result<bool> {
        let mut tx = self.begin_write("Failed to begin enqueue transaction").await?;

        let existing: Option<i32> = sqlx::query_scalar("SELECT status FROM queue WHERE id = ?")
            .bind(request.id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_failed("Failed to look up queue item"))?;

        if let Some(status) = existing.map(Status::from_i32)
            && status != Status::Failed
        {
            tracing::debug!(chapter = %request.id, %status, "Chapter already queued, skipping");
            return Ok(false);
        }

        sqlx::query("DELETE FROM queue WHERE id = ?")
            .bind(request.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Failed to drop failed queue item"))?;

        insert_item(&mut tx, &WorkItem::pending(request.clone())).await?;

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit enqueue"))?;

        tracing::info!(chapter = %request.id, label = %request.label, "Chapter queued");
        Ok(true)
    }

    /// Get one queue item
    pub async fn get_queue_item(&self, id: &ChapterId) -> Result<Option<WorkItem>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {} FROM queue WHERE id = ?",
            QUEUE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to get queue item"))?;

        Ok(row.map(WorkItem::from))
    }

    /// First pending item in store order
    pub async fn next_pending(&self) -> Result<Option<WorkItem>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {} FROM queue WHERE status = ? ORDER BY seq ASC LIMIT 1",
            QUEUE_COLUMNS
        ))
        .bind(Status::Pending.to_i32())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to select pending item"))?;

        Ok(row.map(WorkItem::from))
    }

    /// Queue items with a specific status, in store order
    pub async fn list_queue_by_status(&self, status: Status) -> Result<Vec<WorkItem>> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {} FROM queue WHERE status = ? ORDER BY seq ASC",
            QUEUE_COLUMNS
        ))
        .bind(status.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to list queue by status"))?;

        Ok(rows.into_iter().map(WorkItem::from).collect())
    }

    /// Merge `patch` into the item with `id`
    ///
    /// Returns the updated item, or `None` if no item has that id.
    pub async fn patch_queue_item(
        &self,
        id: &ChapterId,
        patch: WorkItemPatch,
    ) -> Result<Option<WorkItem>> {
        let mut tx = self.begin_write("Failed to begin patch transaction").await?;

        let row = sqlx::query_as::<_, QueueRow>(&format!(
            "SELECT {} FROM queue WHERE id = ?",
            QUEUE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_failed("Failed to read queue item for patch"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut item = WorkItem::from(row);
        patch.apply(&mut item);

        sqlx::query(
            r#"
            UPDATE queue
            SET page_addresses = ?, pages_completed = ?, status = ?, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(&item.page_addresses)?)
        .bind(item.pages_completed as i64)
        .bind(item.status.to_i32())
        .bind(&item.last_error)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(query_failed("Failed to patch queue item"))?;

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit patch"))?;

        Ok(Some(item))
    }

    /// Remove an item from the queue, returning whether it existed
    pub async fn remove_queue_item(&self, id: &ChapterId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queue WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to remove queue item"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Return every active item to pending after an unclean stop
    ///
    /// Failed items are left alone; they only move on an explicit retry.
    pub async fn reset_interrupted(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE queue SET status = ? WHERE status = ?")
            .bind(Status::Pending.to_i32())
            .bind(Status::Active.to_i32())
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to reset interrupted items"))?;

        let reset = result.rows_affected();
        if reset > 0 {
            tracing::info!(count = reset, "Reset interrupted downloads to pending");
        }
        Ok(reset)
    }
}

async fn insert_item(conn: &mut SqliteConnection, item: &WorkItem) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO queue (
            id, parent_id, parent_title, parent_image, label,
            page_addresses, pages_completed, status, created_at, last_error
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item.id.as_str())
    .bind(&item.parent_id)
    .bind(&item.parent_title)
    .bind(&item.parent_image)
    .bind(&item.label)
    .bind(serde_json::to_string(&item.page_addresses)?)
    .bind(item.pages_completed as i64)
    .bind(item.status.to_i32())
    .bind(item.created_at.timestamp_millis())
    .bind(&item.last_error)
    .execute(&mut *conn)
    .await
    .map_err(query_failed("Failed to insert queue item"))?;

    Ok(())
}
