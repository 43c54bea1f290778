//! Resume snapshot persistence, keyed by local artifact path.
//!
//! Snapshots are opaque strings produced by the transfer engine. The store
//! never looks inside them.

use crate::error::query_failed;
use crate::Result;
use std::path::Path;

use super::Database;

impl Database {
    /// Get the snapshot for a local path
    pub async fn get_snapshot(&self, local_path: &Path) -> Result<Option<String>> {
        let snapshot: Option<String> =
            sqlx::query_scalar("SELECT snapshot FROM resume_snapshots WHERE local_path = ?")
                .bind(path_key(local_path))
                .fetch_optional(&self.pool)
                .await
                .map_err(query_failed("Failed to get resume snapshot"))?;

        Ok(snapshot)
    }

    /// Store (or overwrite) the snapshot for a local path
    pub async fn put_snapshot(&self, local_path: &Path, snapshot: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO resume_snapshots (local_path, snapshot, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(local_path) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path_key(local_path))
        .bind(snapshot)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to store resume snapshot"))?;

        Ok(())
    }

    /// Drop the snapshot for a local path (no-op if absent)
    pub async fn clear_snapshot(&self, local_path: &Path) -> Result<()> {
        sqlx::query("DELETE FROM resume_snapshots WHERE local_path = ?")
            .bind(path_key(local_path))
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to clear resume snapshot"))?;

        Ok(())
    }

    /// Drop every snapshot whose local path lies under `dir`
    ///
    /// Returns the number of snapshots removed.
    pub async fn clear_snapshots_under(&self, dir: &Path) -> Result<u64> {
        let mut prefix = path_key(dir);
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }

        // substr instead of LIKE: sanitized directory names are full of '_'
        let result =
            sqlx::query("DELETE FROM resume_snapshots WHERE substr(local_path, 1, length(?)) = ?")
                .bind(&prefix)
                .bind(&prefix)
                .execute(&self.pool)
                .await
                .map_err(query_failed("Failed to clear resume snapshots"))?;

        Ok(result.rows_affected())
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
