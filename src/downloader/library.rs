//! Downloaded chapter queries and deletion.

use crate::error::{DownloadError, Result};
use crate::types::{ChapterId, IndexEntry, ParentGroup, Status, group_by_parent};
use crate::utils::{remove_dir_if_exists, sanitize_component};

use super::ChapterDownloader;

impl ChapterDownloader {
    /// Whether a chapter is in the offline library
    pub async fn is_downloaded(&self, id: &ChapterId) -> Result<bool> {
        self.db.is_downloaded(id).await
    }

    /// Library entry of one chapter
    pub async fn get(&self, id: &ChapterId) -> Result<Option<IndexEntry>> {
        self.db.get_index_entry(id).await
    }

    /// All library entries, most recently completed first
    pub async fn list(&self) -> Result<Vec<IndexEntry>> {
        self.db.list_index().await
    }

    /// Library entries grouped by parent
    ///
    /// Groups are ordered by their most recently completed chapter.
    pub async fn list_by_parent(&self) -> Result<Vec<ParentGroup>> {
        Ok(group_by_parent(self.db.list_index().await?))
    }

    /// Library entries of one parent, most recent first
    pub async fn list_for_parent(&self, parent_id: &str) -> Result<Vec<IndexEntry>> {
        self.db.list_index_by_parent(parent_id).await
    }

    /// Delete a downloaded chapter and its page files
    ///
    /// Returns `false` if the chapter was not in the library.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] while the chapter is being
    /// downloaded again.
    pub async fn delete_chapter(&self, id: &ChapterId) -> Result<bool> {
        if let Some(item) = self.db.get_queue_item(id).await?
            && item.status == Status::Active
        {
            return Err(DownloadError::InvalidState {
                id: id.to_string(),
                operation: "delete".to_string(),
                current_state: item.status.to_string(),
            }
            .into());
        }

        let Some(entry) = self.db.delete_index_entry(id).await? else {
            return Ok(false);
        };

        self.remove_artifacts(&entry).await?;
        tracing::info!(chapter = %id, label = %entry.label, "Deleted downloaded chapter");
        Ok(true)
    }

    /// Delete every downloaded chapter of a parent
    ///
    /// Returns the number of deleted entries. The parent directory is removed
    /// once it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] if any chapter of the parent is
    /// being downloaded; nothing is deleted in that case.
    pub async fn delete_all_for_parent(&self, parent_id: &str) -> Result<usize> {
        let active = self.db.list_queue_by_status(Status::Active).await?;
        if let Some(item) = active.iter().find(|item| item.parent_id == parent_id) {
            return Err(DownloadError::InvalidState {
                id: item.id.to_string(),
                operation: "delete".to_string(),
                current_state: item.status.to_string(),
            }
            .into());
        }

        let entries = self.db.delete_index_for_parent(parent_id).await?;
        for entry in &entries {
            self.remove_artifacts(entry).await?;
        }

        let parent_dir = self
            .config
            .download_dir()
            .join(sanitize_component(parent_id));
        // Fails while queued chapters still keep partial files there
        if tokio::fs::remove_dir(&parent_dir).await.is_ok() {
            tracing::debug!(path = %parent_dir.display(), "Removed empty parent directory");
        }

        tracing::info!(parent = parent_id, deleted = entries.len(), "Deleted parent from library");
        Ok(entries.len())
    }

    async fn remove_artifacts(&self, entry: &IndexEntry) -> Result<()> {
        let Some(dir) = entry.artifact_dir() else {
            return Ok(());
        };

        self.db.clear_snapshots_under(&dir).await?;
        if !remove_dir_if_exists(&dir).await? {
            tracing::warn!(
                chapter = %entry.id,
                path = %dir.display(),
                "Artifact directory already missing"
            );
        }
        Ok(())
    }
}
