//! HTTP implementation of [`TransferEngine`] with range-request resume.

use super::{ResumeSnapshot, SnapshotSink, TransferEngine};
use crate::config::{DownloadConfig, RetryConfig};
use crate::error::{DownloadError, Error};
use crate::retry::with_retry;
use crate::utils::{file_len, part_path};
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, ETAG, HeaderMap, IF_RANGE, LAST_MODIFIED, RANGE};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;

/// Transfers pages over HTTP(S) with `Range`/`If-Range` continuation
///
/// Transient failures (timeouts, dropped connections, 5xx and 429 answers)
/// are retried in place according to the configured [`RetryConfig`]; each
/// retry continues from the bytes already on disk.
pub struct HttpTransferEngine {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpTransferEngine {
    /// Create an engine with the configured User-Agent, timeout and retries
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config.retry.clone()))
    }

    /// Create an engine around an existing client
    pub fn with_client(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// One request/response cycle, writing into the `.part` file
    ///
    /// A `416` answer discards the partial file and refetches once from zero
    /// within the same attempt.
    async fn transfer_once(
        &self,
        address: &str,
        local: &Path,
        part: &Path,
        state: &Mutex<ResumeSnapshot>,
        sink: &dyn SnapshotSink,
    ) -> Result<()> {
        let mut restarted = false;

        loop {
            let offset = file_len(part).await?;
            let validator = lock(state).validator.clone();

            let mut request = self.client.get(address);
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", offset));
                if let Some(validator) = &validator {
                    request = request.header(IF_RANGE, validator.as_str());
                }
            }

            let mut response = request.send().await?;
            let status = response.status();

            let append = match status {
                StatusCode::PARTIAL_CONTENT if offset > 0 => true,
                StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 && !restarted => {
                    tracing::warn!(
                        address,
                        offset,
                        "Server rejected resume range, discarding partial file"
                    );
                    remove_part(part).await?;
                    *lock(state) = ResumeSnapshot::fresh(address);
                    restarted = true;
                    continue;
                }
                s if s.is_success() => {
                    if offset > 0 {
                        tracing::debug!(
                            address,
                            status = s.as_u16(),
                            "Range not honored, refetching from zero"
                        );
                    }
                    false
                }
                s => {
                    return Err(DownloadError::TransferFailed {
                        address: address.to_string(),
                        reason: format!("HTTP {}", s),
                        status: Some(s.as_u16()),
                    }
                    .into());
                }
            };

            let start = if append { offset } else { 0 };
            let total_bytes = if append {
                content_range_total(response.headers())
                    .or_else(|| response.content_length().map(|len| len + offset))
            } else {
                response.content_length()
            };

            let snapshot = {
                let mut current = lock(state);
                current.bytes_received = start;
                current.total_bytes = total_bytes;
                current.validator = validator_of(response.headers());
                current.clone()
            };
            if let Err(e) = sink.checkpoint(local, &snapshot.encode()?).await {
                tracing::warn!(path = %local.display(), error = %e, "Failed to checkpoint resume snapshot");
            }

            let mut file = if append {
                tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(part)
                    .await
                    .map_err(write_failed(part))?
            } else {
                tokio::fs::File::create(part)
                    .await
                    .map_err(write_failed(part))?
            };

            let mut received = start;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await.map_err(write_failed(part))?;
                received += chunk.len() as u64;
            }
            file.flush().await.map_err(write_failed(part))?;

            if let Some(total) = total_bytes
                && received < total
            {
                // Retried as transient; the next attempt resumes from `received`
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("received {} of {} bytes", received, total),
                )));
            }

            tracing::debug!(address, bytes = received, resumed_from = start, "Page transferred");
            return Ok(());
        }
    }
}

#[async_trait]
impl TransferEngine for HttpTransferEngine {
    async fn prepare(
        &self,
        address: &str,
        local: &Path,
        previous: Option<&str>,
    ) -> Result<String> {
        if tokio::fs::try_exists(local).await? {
            let len = file_len(local).await?;
            return ResumeSnapshot {
                remote_address: address.to_string(),
                bytes_received: len,
                total_bytes: Some(len),
                validator: None,
            }
            .encode();
        }

        let part = part_path(local);
        let on_disk = file_len(&part).await?;

        let snapshot = match previous.and_then(ResumeSnapshot::decode) {
            Some(prev)
                if prev.remote_address == address
                    && on_disk > 0
                    && prev.total_bytes.is_none_or(|total| on_disk <= total) =>
            {
                ResumeSnapshot {
                    bytes_received: on_disk,
                    ..prev
                }
            }
            _ => {
                if on_disk > 0 {
                    tracing::debug!(
                        path = %part.display(),
                        "Discarding partial file without a matching snapshot"
                    );
                    remove_part(&part).await?;
                }
                ResumeSnapshot::fresh(address)
            }
        };

        snapshot.encode()
    }

    async fn fetch_bytes(
        &self,
        address: &str,
        local: &Path,
        resume: Option<&str>,
        sink: &dyn SnapshotSink,
    ) -> Result<PathBuf> {
        if tokio::fs::try_exists(local).await? {
            tracing::debug!(path = %local.display(), "Page already on disk, skipping transfer");
            return Ok(local.to_path_buf());
        }

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed(parent))?;
        }

        let part = part_path(local);
        let on_disk = file_len(&part).await?;

        let snapshot = match resume
            .and_then(ResumeSnapshot::decode)
            .filter(|s| s.remote_address == address)
        {
            Some(snapshot) => ResumeSnapshot {
                bytes_received: on_disk,
                ..snapshot
            },
            None => {
                if on_disk > 0 {
                    remove_part(&part).await?;
                }
                ResumeSnapshot::fresh(address)
            }
        };

        if !snapshot.is_complete() {
            let state = Mutex::new(snapshot);
            with_retry(&self.retry, || {
                self.transfer_once(address, local, &part, &state, sink)
            })
            .await
            .map_err(|e| into_transfer_error(address, e))?;
        } else {
            tracing::debug!(path = %part.display(), "Partial file already complete, promoting");
        }

        tokio::fs::rename(&part, local)
            .await
            .map_err(write_failed(local))?;

        Ok(local.to_path_buf())
    }
}

fn lock(state: &Mutex<ResumeSnapshot>) -> MutexGuard<'_, ResumeSnapshot> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Total size from a `Content-Range: bytes a-b/total` header
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn validator_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .or_else(|| headers.get(LAST_MODIFIED))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn remove_part(part: &Path) -> Result<()> {
    match tokio::fs::remove_file(part).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(write_failed(part)(e)),
    }
}

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |e| {
        DownloadError::ArtifactWriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    }
}

/// Report exhausted network and I/O failures as transfer failures of `address`
fn into_transfer_error(address: &str, error: Error) -> Error {
    match error {
        Error::Network(e) => DownloadError::TransferFailed {
            address: address.to_string(),
            reason: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        }
        .into(),
        Error::Io(e) => DownloadError::transfer(address, e).into(),
        other => other,
    }
}
