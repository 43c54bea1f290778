//! Resumable single-page transfers
//!
//! A [`TransferEngine`] moves the bytes of one remote page into one local
//! artifact path. Artifacts are written to `<local>.part` first and renamed
//! once complete, so an existing local path is always a finished page.
//!
//! Resume state travels as an opaque string (a serialized
//! [`ResumeSnapshot`] for the HTTP engine). The worker persists it before the
//! transfer starts and clears it after success; the engine may checkpoint an
//! improved snapshot through a [`SnapshotSink`] once the server has answered.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod http;

pub use http::HttpTransferEngine;

/// One resumable byte transfer from a remote address to a local path
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Build the resume snapshot for a transfer that is about to start
    ///
    /// `previous` is the snapshot persisted by an earlier, interrupted attempt
    /// for the same local path, if any.
    async fn prepare(&self, address: &str, local: &Path, previous: Option<&str>)
        -> Result<String>;

    /// Transfer `address` into `local`, continuing from `resume` when possible
    ///
    /// Returns the local path of the finished artifact. Returns immediately
    /// when `local` already exists.
    async fn fetch_bytes(
        &self,
        address: &str,
        local: &Path,
        resume: Option<&str>,
        sink: &dyn SnapshotSink,
    ) -> Result<PathBuf>;
}

/// Durable destination for snapshots learned mid-transfer
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persist `snapshot` for `local`
    async fn checkpoint(&self, local: &Path, snapshot: &str) -> Result<()>;
}

#[async_trait]
impl SnapshotSink for crate::db::Database {
    async fn checkpoint(&self, local: &Path, snapshot: &str) -> Result<()> {
        self.put_snapshot(local, snapshot).await
    }
}

/// Sink that drops every checkpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSnapshots;

#[async_trait]
impl SnapshotSink for DiscardSnapshots {
    async fn checkpoint(&self, _local: &Path, _snapshot: &str) -> Result<()> {
        Ok(())
    }
}

/// Resume state of one HTTP page transfer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    /// Address the partial bytes came from
    pub remote_address: String,
    /// Bytes already on disk in the `.part` file
    pub bytes_received: u64,
    /// Full size of the artifact, once the server has told us
    #[serde(default)]
    pub total_bytes: Option<u64>,
    /// ETag or Last-Modified value for `If-Range`
    #[serde(default)]
    pub validator: Option<String>,
}

impl ResumeSnapshot {
    /// Snapshot for a transfer starting from zero
    pub fn fresh(address: &str) -> Self {
        Self {
            remote_address: address.to_string(),
            ..Default::default()
        }
    }

    /// Parse a stored snapshot, or `None` if it is unreadable
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable resume snapshot");
                None
            }
        }
    }

    /// Serialize for storage
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether the partial bytes already make up the whole artifact
    pub fn is_complete(&self) -> bool {
        self.bytes_received > 0 && self.total_bytes == Some(self.bytes_received)
    }
}
