//! Utility functions for artifact path layout and file cleanup
//!
//! Pages of one chapter live in a single directory:
//! `<download_dir>/<sanitized parent>/<sanitized chapter>/page_0000.<ext>`.

use std::path::{Path, PathBuf};

/// Extension used when a page address carries none
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Turn a remote reference into a single safe path component
///
/// A leading `http://` or `https://` is dropped and every character that is
/// not ASCII alphanumeric becomes `_`.
///
/// # Examples
///
/// ```
/// use chapter_dl::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("https://site.example/manga/x-1"), "site_example_manga_x_1");
/// ```
pub fn sanitize_component(reference: &str) -> String {
    let stripped = reference
        .strip_prefix("https://")
        .or_else(|| reference.strip_prefix("http://"))
        .unwrap_or(reference);

    let sanitized: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Directory holding the pages of one chapter
pub fn chapter_dir(download_dir: &Path, parent_id: &str, chapter_id: &str) -> PathBuf {
    download_dir
        .join(sanitize_component(parent_id))
        .join(sanitize_component(chapter_id))
}

/// Local path of page `index` (zero-based) inside `dir`
pub fn page_path(dir: &Path, index: usize, address: &str) -> PathBuf {
    dir.join(format!("page_{:04}.{}", index, infer_extension(address)))
}

/// Temporary path an artifact is written to before it is complete
pub fn part_path(local: &Path) -> PathBuf {
    let mut name = local.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// File extension of a page address, ignoring query and fragment
///
/// Falls back to [`DEFAULT_EXTENSION`] when the last path segment has no
/// usable extension.
pub fn infer_extension(address: &str) -> String {
    let last_segment = match url::Url::parse(address) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        // Relative or malformed addresses: strip query by hand
        Err(_) => address
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(str::to_string),
    };

    last_segment
        .as_deref()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Remove a directory tree, treating "already gone" as success
pub async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Size of a file, or 0 if it does not exist
pub async fn file_len(path: &Path) -> std::io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}
