//! Mock chapter sources served by wiremock

use chapter_dl::DownloadRequest;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic page body for page `index` of `chapter`
pub fn page_bytes(chapter: &str, index: usize) -> Vec<u8> {
    format!("{}-page-{}-", chapter, index).repeat(64).into_bytes()
}

/// Path of page `index` of `chapter` on the mock server
pub fn page_route(chapter: &str, index: usize) -> String {
    format!("/img/{}/{}.jpg", chapter, index)
}

/// Path of the chapter document on the mock server
pub fn chapter_route(chapter: &str) -> String {
    format!("/manga/foo/{}", chapter)
}

/// Serve a chapter document listing `pages` pages, plus every page
pub async fn mount_chapter(server: &MockServer, chapter: &str, pages: usize) {
    mount_chapter_document(server, chapter, pages).await;
    for index in 0..pages {
        Mock::given(method("GET"))
            .and(path(page_route(chapter, index)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(page_bytes(chapter, index)))
            .mount(server)
            .await;
    }
}

/// Serve only the chapter document; pages are left to the caller
pub async fn mount_chapter_document(server: &MockServer, chapter: &str, pages: usize) {
    let list: String = (0..pages)
        .map(|index| format!("'{}',", page_route(chapter, index)))
        .collect();
    let html = format!(
        "<html><script>var thzq=[{}];</script><body>{}</body></html>",
        list, chapter
    );

    Mock::given(method("GET"))
        .and(path(chapter_route(chapter)))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// Download request for a chapter served by `server`
pub fn chapter_request(server: &MockServer, chapter: &str) -> DownloadRequest {
    DownloadRequest::new(
        format!("{}{}", server.uri(), chapter_route(chapter)),
        format!("{}/manga/foo", server.uri()),
        "Foo",
        format!("{}/covers/foo.jpg", server.uri()),
        format!("Chapter {}", chapter),
    )
}

/// Number of requests the server received for `route`
pub async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}
