//! Page resolution: chapter reference to ordered page addresses
//!
//! The worker only depends on the [`PageResolver`] trait. [`PatternPageResolver`]
//! is a ready-made implementation for sources that embed the page list in the
//! chapter document, such as `var thzq=['a.jpg','b.jpg',];`.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Error};
use crate::types::ChapterId;
use crate::Result;
use async_trait::async_trait;
use regex::Regex;

/// Default extraction pattern: a JavaScript array literal with a trailing comma
pub const DEFAULT_PAGE_PATTERN: &str = r"var thzq=\[(.*?),\]";

/// Resolves a chapter reference to its ordered page addresses
///
/// An empty list is a valid answer; the worker turns it into a
/// "No pages found" failure.
#[async_trait]
pub trait PageResolver: Send + Sync {
    /// Page addresses of `chapter`, in reading order
    async fn resolve_pages(&self, chapter: &ChapterId) -> Result<Vec<String>>;
}

/// Fetches the chapter document and extracts page addresses with a regex
///
/// The chapter reference must be an absolute URL. The first capture group of
/// the pattern must hold a comma-separated list of (optionally quoted)
/// addresses; relative addresses are resolved against the chapter URL.
pub struct PatternPageResolver {
    client: reqwest::Client,
    pattern: Regex,
}

impl PatternPageResolver {
    /// Create a resolver using [`DEFAULT_PAGE_PATTERN`]
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Self::with_pattern(config, DEFAULT_PAGE_PATTERN)
    }

    /// Create a resolver with a custom extraction pattern
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the pattern does not compile or has no
    /// capture group
    pub fn with_pattern(config: &DownloadConfig, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| Error::Config {
            message: format!("invalid page pattern: {}", e),
            key: Some("page_pattern".to_string()),
        })?;
        if pattern.captures_len() < 2 {
            return Err(Error::Config {
                message: "page pattern needs a capture group".to_string(),
                key: Some("page_pattern".to_string()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, pattern })
    }

    /// Extract page addresses from a chapter document
    pub fn extract(&self, document: &str, base: Option<&url::Url>) -> Vec<String> {
        let Some(list) = self.pattern.captures(document).and_then(|c| c.get(1)) else {
            return Vec::new();
        };

        list.as_str()
            .split(',')
            .map(|raw| raw.trim().replace(['\'', '"'], ""))
            .filter(|address| !address.is_empty())
            .map(|address| match base {
                Some(base) if url::Url::parse(&address).is_err() => base
                    .join(&address)
                    .map(String::from)
                    .unwrap_or(address),
                _ => address,
            })
            .collect()
    }
}

#[async_trait]
impl PageResolver for PatternPageResolver {
    async fn resolve_pages(&self, chapter: &ChapterId) -> Result<Vec<String>> {
        let unavailable = |reason: String| {
            Error::Download(DownloadError::SourceUnavailable {
                chapter: chapter.to_string(),
                reason,
            })
        };

        let base = url::Url::parse(chapter.as_str())
            .map_err(|e| unavailable(format!("invalid chapter URL: {}", e)))?;

        let response = self
            .client
            .get(base.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }

        let document = response.text().await.map_err(|e| unavailable(e.to_string()))?;
        let pages = self.extract(&document, Some(&base));

        tracing::debug!(chapter = %chapter, pages = pages.len(), "Resolved chapter pages");
        Ok(pages)
    }
}
