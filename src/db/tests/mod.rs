mod queue;

use crate::types::DownloadRequest;

/// Request for chapter `id` of parent `m1`
pub(super) fn request(id: &str) -> DownloadRequest {
    request_for("m1", id)
}

/// Request for chapter `id` of `parent`
pub(super) fn request_for(parent: &str, id: &str) -> DownloadRequest {
    DownloadRequest::new(
        id,
        parent,
        format!("Title of {}", parent),
        format!("https://img.example.com/{}.jpg", parent),
        format!("Chapter {}", id),
    )
}
