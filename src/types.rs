//! Core types for chapter-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote chapter reference, the unique key of a queue item and index entry
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub String);

impl ChapterId {
    /// Create a new ChapterId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner reference
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChapterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChapterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<&str> for ChapterId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue item status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting for the worker
    Pending,
    /// Currently being transferred
    Active,
    /// Folded into the download index
    Done,
    /// Attempt abandoned, waiting for an explicit retry
    Failed,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::Active,
            2 => Status::Done,
            3 => Status::Failed,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Active => 1,
            Status::Done => 2,
            Status::Failed => 3,
        }
    }

    /// Whether this status blocks a new enqueue for the same chapter
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Status::Pending | Status::Active)
    }

    /// Whether this status ends a progress sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Active => "active",
            Status::Done => "done",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A request from the UI to save one chapter offline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Chapter reference
    pub id: ChapterId,
    /// Parent (series) reference
    pub parent_id: String,
    /// Parent display title
    pub parent_title: String,
    /// Parent cover image address
    pub parent_image: String,
    /// Chapter display name
    pub label: String,
}

impl DownloadRequest {
    /// Build a request from its parts
    pub fn new(
        id: impl Into<ChapterId>,
        parent_id: impl Into<String>,
        parent_title: impl Into<String>,
        parent_image: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            parent_title: parent_title.into(),
            parent_image: parent_image.into(),
            label: label.into(),
        }
    }
}

/// One queued chapter download and its progress state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Chapter reference (unique key)
    pub id: ChapterId,
    /// Parent (series) reference
    pub parent_id: String,
    /// Parent display title
    pub parent_title: String,
    /// Parent cover image address
    pub parent_image: String,
    /// Chapter display name
    pub label: String,
    /// Resolved page addresses, empty until resolution
    pub page_addresses: Vec<String>,
    /// Number of pages already transferred, in order
    pub pages_completed: usize,
    /// Current status
    pub status: Status,
    /// When the item was queued
    pub created_at: DateTime<Utc>,
    /// Error message of the last failed attempt
    pub last_error: Option<String>,
}

impl WorkItem {
    /// Fresh pending item for a request
    pub fn pending(request: DownloadRequest) -> Self {
        Self {
            id: request.id,
            parent_id: request.parent_id,
            parent_title: request.parent_title,
            parent_image: request.parent_image,
            label: request.label,
            page_addresses: Vec::new(),
            pages_completed: 0,
            status: Status::Pending,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    /// The request this item was created from
    pub fn request(&self) -> DownloadRequest {
        DownloadRequest {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            parent_title: self.parent_title.clone(),
            parent_image: self.parent_image.clone(),
            label: self.label.clone(),
        }
    }

    /// Fraction of pages transferred (0.0 when unresolved)
    pub fn progress(&self) -> f32 {
        if self.page_addresses.is_empty() {
            0.0
        } else {
            self.pages_completed as f32 / self.page_addresses.len() as f32
        }
    }
}

/// Partial update merged into a [`WorkItem`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkItemPatch {
    /// New status
    pub status: Option<Status>,
    /// Newly resolved page addresses
    pub page_addresses: Option<Vec<String>>,
    /// New completed page count
    pub pages_completed: Option<usize>,
    /// Error message (kept only when the resulting status is failed)
    pub last_error: Option<String>,
}

impl WorkItemPatch {
    /// Patch that only changes the status
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch that marks the item failed with a message
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(Status::Failed),
            last_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Patch that records the completed page count
    pub fn pages_completed(count: usize) -> Self {
        Self {
            pages_completed: Some(count),
            ..Default::default()
        }
    }

    /// Patch that caches resolved page addresses
    pub fn page_addresses(addresses: Vec<String>) -> Self {
        Self {
            page_addresses: Some(addresses),
            ..Default::default()
        }
    }

    /// Merge this patch into an item
    ///
    /// `pages_completed` is clamped to the number of known page addresses and
    /// `last_error` only survives on a failed item.
    pub fn apply(self, item: &mut WorkItem) {
        if let Some(status) = self.status {
            item.status = status;
        }
        if let Some(addresses) = self.page_addresses {
            item.page_addresses = addresses;
        }
        if let Some(count) = self.pages_completed {
            item.pages_completed = count;
        }
        item.pages_completed = item.pages_completed.min(item.page_addresses.len());

        if item.status == Status::Failed {
            if let Some(error) = self.last_error {
                item.last_error = Some(error);
            }
        } else {
            item.last_error = None;
        }
    }
}

/// A fully downloaded chapter in the offline library
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Chapter reference
    pub id: ChapterId,
    /// Parent (series) reference
    pub parent_id: String,
    /// Parent display title
    pub parent_title: String,
    /// Parent cover image address
    pub parent_image: String,
    /// Chapter display name
    pub label: String,
    /// Local page files in page order
    pub local_artifacts: Vec<PathBuf>,
    /// When the download finished
    pub completed_at: DateTime<Utc>,
    /// Number of pages (always `local_artifacts.len()`)
    pub page_count: usize,
}

impl IndexEntry {
    /// Build the index entry for a finished work item
    pub fn from_completed(item: &WorkItem, local_artifacts: Vec<PathBuf>) -> Self {
        Self {
            id: item.id.clone(),
            parent_id: item.parent_id.clone(),
            parent_title: item.parent_title.clone(),
            parent_image: item.parent_image.clone(),
            label: item.label.clone(),
            page_count: local_artifacts.len(),
            local_artifacts,
            completed_at: Utc::now(),
        }
    }

    /// Directory holding this entry's page files
    pub fn artifact_dir(&self) -> Option<PathBuf> {
        self.local_artifacts
            .first()
            .and_then(|p| p.parent())
            .map(PathBuf::from)
    }
}

/// Index entries of one parent, for library display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParentGroup {
    /// Parent (series) reference
    pub parent_id: String,
    /// Parent display title
    pub parent_title: String,
    /// Parent cover image address
    pub parent_image: String,
    /// Entries of this parent, most recent first
    pub entries: Vec<IndexEntry>,
    /// Sum of page counts over all entries
    pub total_pages: usize,
}

/// Group index entries by parent, keeping first-appearance order
pub fn group_by_parent(entries: Vec<IndexEntry>) -> Vec<ParentGroup> {
    let mut groups: Vec<ParentGroup> = Vec::new();

    for entry in entries {
        match groups.iter_mut().find(|g| g.parent_id == entry.parent_id) {
            Some(group) => {
                group.total_pages += entry.page_count;
                group.entries.push(entry);
            }
            None => groups.push(ParentGroup {
                parent_id: entry.parent_id.clone(),
                parent_title: entry.parent_title.clone(),
                parent_image: entry.parent_image.clone(),
                total_pages: entry.page_count,
                entries: vec![entry],
            }),
        }
    }

    groups
}

/// Progress event published for one chapter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Chapter reference
    pub id: ChapterId,
    /// Fraction of pages transferred (0.0 to 1.0)
    pub progress: f32,
    /// Item status at the time of the update
    pub status: Status,
}

/// Host application lifecycle state, used for foreground-transition triggers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// Visible and interactive
    Active,
    /// Visible but not receiving input
    Inactive,
    /// Suspended in the background
    Background,
}
