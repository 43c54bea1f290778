//! Database layer for chapter-dl
//!
//! Handles SQLite persistence for the work queue, resume snapshots, the
//! download index and runtime state. Every multi-row mutation runs inside a
//! transaction, so a process killed mid-write leaves the previous state intact.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`queue`] - Work queue (QueueStore)
//! - [`snapshots`] - Resume snapshots keyed by local artifact path
//! - [`index`] - Completed downloads (DownloadIndex)
//! - [`state`] - Runtime state (shutdown tracking, drain lease)

use crate::types::{ChapterId, IndexEntry, Status, WorkItem};
use chrono::{DateTime, TimeZone, Utc};
use crate::Result;
use crate::error::query_failed;
use sqlx::{FromRow, Sqlite, Transaction, sqlite::SqlitePool};
use std::path::PathBuf;

mod index;
mod migrations;
mod queue;
mod snapshots;
mod state;

/// Queue record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct QueueRow {
    /// Insertion sequence (store order)
    pub seq: i64,
    /// Chapter reference
    pub id: String,
    /// Parent reference
    pub parent_id: String,
    /// Parent display title
    pub parent_title: String,
    /// Parent cover image address
    pub parent_image: String,
    /// Chapter display name
    pub label: String,
    /// JSON array of resolved page addresses
    pub page_addresses: String,
    /// Pages transferred so far
    pub pages_completed: i64,
    /// Status code (see [`Status::to_i32`])
    pub status: i32,
    /// Unix timestamp in milliseconds when the item was queued
    pub created_at: i64,
    /// Error message of the last failed attempt
    pub last_error: Option<String>,
}

impl From<QueueRow> for WorkItem {
    fn from(row: QueueRow) -> Self {
        let page_addresses = match serde_json::from_str::<Vec<String>>(&row.page_addresses) {
            Ok(addresses) => addresses,
            Err(e) => {
                // Unreadable cache only costs a re-resolution
                tracing::warn!(
                    chapter = %row.id,
                    error = %e,
                    "Discarding unreadable cached page addresses"
                );
                Vec::new()
            }
        };
        let pages_completed = (row.pages_completed.max(0) as usize).min(page_addresses.len());

        WorkItem {
            id: ChapterId(row.id),
            parent_id: row.parent_id,
            parent_title: row.parent_title,
            parent_image: row.parent_image,
            label: row.label,
            page_addresses,
            pages_completed,
            status: Status::from_i32(row.status),
            created_at: from_millis(row.created_at),
            last_error: row.last_error,
        }
    }
}

/// Download index record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct IndexRow {
    /// Insertion sequence (higher is more recent)
    pub seq: i64,
    /// Chapter reference
    pub id: String,
    /// Parent reference
    pub parent_id: String,
    /// Parent display title
    pub parent_title: String,
    /// Parent cover image address
    pub parent_image: String,
    /// Chapter display name
    pub label: String,
    /// JSON array of local artifact paths
    pub local_artifacts: String,
    /// Number of pages
    pub page_count: i64,
    /// Unix timestamp in milliseconds when the download finished
    pub completed_at: i64,
}

impl IndexRow {
    /// Convert into an [`IndexEntry`], or `None` if the artifact list is unreadable
    pub fn into_entry(self) -> Option<IndexEntry> {
        let local_artifacts = match serde_json::from_str::<Vec<PathBuf>>(&self.local_artifacts) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!(
                    chapter = %self.id,
                    error = %e,
                    "Index entry has an unreadable artifact list, skipping it"
                );
                return None;
            }
        };

        if local_artifacts.len() as i64 != self.page_count {
            tracing::warn!(
                chapter = %self.id,
                stored = self.page_count,
                actual = local_artifacts.len(),
                "Index page count disagrees with artifact list, using artifact list"
            );
        }

        Some(IndexEntry {
            id: ChapterId(self.id),
            parent_id: self.parent_id,
            parent_title: self.parent_title,
            parent_image: self.parent_image,
            label: self.label,
            page_count: local_artifacts.len(),
            local_artifacts,
            completed_at: from_millis(self.completed_at),
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Database handle for chapter-dl
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Start a transaction that takes the write lock immediately
    ///
    /// Read-then-write transactions must use this: a deferred one that
    /// upgrades after a concurrent commit fails with `SQLITE_BUSY` without
    /// waiting on the busy timeout.
    pub(crate) async fn begin_write(&self, context: &str) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(query_failed(context))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
