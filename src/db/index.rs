//! Download index persistence (DownloadIndex).
//!
//! Entries are listed most recent first. Rows whose artifact list cannot be
//! read are skipped on read but never deleted automatically.

use crate::error::query_failed;
use crate::types::{ChapterId, IndexEntry};
use crate::Result;
use sqlx::SqliteConnection;

use super::{Database, IndexRow};

const INDEX_COLUMNS: &str = "seq, id, parent_id, parent_title, parent_image, label, \
     local_artifacts, page_count, completed_at";

impl Database {
    /// Insert an index entry, replacing any entry with the same id
    ///
    /// The new entry becomes the most recent one.
    pub async fn insert_index_entry(&self, entry: &IndexEntry) -> Result<()> {
        let mut tx = self.begin_write("Failed to begin index transaction").await?;

        upsert_entry(&mut tx, entry).await?;

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit index entry"))?;

        Ok(())
    }

    /// Fold a finished chapter into the index in one transaction
    ///
    /// Inserts the index entry, removes the queue item and drops any resume
    /// snapshots under the entry's artifact directory. Readers never observe
    /// the chapter in both stores or in neither.
    pub async fn commit_completed(&self, entry: &IndexEntry) -> Result<()> {
        let mut tx = self.begin_write("Failed to begin completion transaction").await?;

        upsert_entry(&mut tx, entry).await?;

        sqlx::query("DELETE FROM queue WHERE id = ?")
            .bind(entry.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Failed to remove completed queue item"))?;

        for path in &entry.local_artifacts {
            sqlx::query("DELETE FROM resume_snapshots WHERE local_path = ?")
                .bind(path.to_string_lossy().as_ref())
                .execute(&mut *tx)
                .await
                .map_err(query_failed("Failed to clear resume snapshot"))?;
        }

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit completed chapter"))?;

        tracing::info!(
            chapter = %entry.id,
            pages = entry.page_count,
            "Chapter added to download index"
        );
        Ok(())
    }

    /// Get the index entry for a chapter
    pub async fn get_index_entry(&self, id: &ChapterId) -> Result<Option<IndexEntry>> {
        let row = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM download_index WHERE id = ?",
            INDEX_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to get index entry"))?;

        Ok(row.and_then(IndexRow::into_entry))
    }

    /// Whether the chapter has a readable index entry
    pub async fn is_downloaded(&self, id: &ChapterId) -> Result<bool> {
        Ok(self.get_index_entry(id).await?.is_some())
    }

    /// All readable index entries, most recent first
    pub async fn list_index(&self) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM download_index ORDER BY seq DESC",
            INDEX_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to list download index"))?;

        Ok(rows.into_iter().filter_map(IndexRow::into_entry).collect())
    }

    /// Readable index entries of one parent, most recent first
    pub async fn list_index_by_parent(&self, parent_id: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM download_index WHERE parent_id = ? ORDER BY seq DESC",
            INDEX_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to list index by parent"))?;

        Ok(rows.into_iter().filter_map(IndexRow::into_entry).collect())
    }

    /// Delete the index entry for a chapter, returning it if it existed
    pub async fn delete_index_entry(&self, id: &ChapterId) -> Result<Option<IndexEntry>> {
        let row = sqlx::query_as::<_, IndexRow>(&format!(
            "DELETE FROM download_index WHERE id = ? RETURNING {}",
            INDEX_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to delete index entry"))?;

        Ok(row.and_then(IndexRow::into_entry))
    }

    /// Delete every index entry of a parent, returning the readable ones
    pub async fn delete_index_for_parent(&self, parent_id: &str) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query_as::<_, IndexRow>(&format!(
            "DELETE FROM download_index WHERE parent_id = ? RETURNING {}",
            INDEX_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to delete index entries for parent"))?;

        Ok(rows.into_iter().filter_map(IndexRow::into_entry).collect())
    }
}

async fn upsert_entry(conn: &mut SqliteConnection, entry: &IndexEntry) -> Result<()> {
    sqlx::query("DELETE FROM download_index WHERE id = ?")
        .bind(entry.id.as_str())
        .execute(&mut *conn)
        .await
        .map_err(query_failed("Failed to replace index entry"))?;

    sqlx::query(
        r#"
        INSERT INTO download_index (
            id, parent_id, parent_title, parent_image, label,
            local_artifacts, page_count, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.as_str())
    .bind(&entry.parent_id)
    .bind(&entry.parent_title)
    .bind(&entry.parent_image)
    .bind(&entry.label)
    .bind(serde_json::to_string(&entry.local_artifacts)?)
    .bind(entry.local_artifacts.len() as i64)
    .bind(entry.completed_at.timestamp_millis())
    .execute(&mut *conn)
    .await
    .map_err(query_failed("Failed to insert index entry"))?;

    Ok(())
}
