// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::sniff::{content_type_is_xml, is_xml, looks_like_xml};

/// A downloaded feed document, not yet parsed
#[derive(Debug, Clone)]
pub struct FeedDownload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl FeedDownload {
    /// Whether the download is XML, judged by address, header, then content
    pub fn is_xml(&self, url: &str) -> bool {
        is_xml(url)
            || self.content_type.as_deref().is_some_and(content_type_is_xml)
            || looks_like_xml(&self.bytes)
    }
}

/// Download a feed document from a URL (without parsing)
pub async fn fetch_feed<C: HttpClient>(client: &C, url: &str) -> Result<FeedDownload, FeedError> {
    let fetch_failed = |e| FeedError::FetchFailed {
        url: url.to_string(),
        source: e,
    };

    let response = client.get_stream(url).await.map_err(fetch_failed)?;

    if response.status >= 400 {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let mut buffer = BytesMut::with_capacity(response.content_length.unwrap_or(0) as usize);
    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk.map_err(fetch_failed)?);
    }

    Ok(FeedDownload {
        bytes: buffer.freeze(),
        content_type: response.content_type,
    })
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::http::{ByteStream, HttpResponse};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct MockHttpClient {
        status: u16,
        content_type: Option<&'static str>,
        chunks: Vec<&'static [u8]>,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from(self.chunks.concat()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            let chunks: Vec<Result<Bytes, reqwest::Error>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect();
            let body: ByteStream = Box::pin(futures::stream::iter(chunks));

            Ok(HttpResponse {
                status: self.status,
                content_length: None,
                content_type: self.content_type.map(String::from),
                body,
            })
        }
    }

    #[tokio::test]
    async fn fetch_feed_collects_chunks() {
        let client = MockHttpClient {
            status: 200,
            content_type: Some("application/rss+xml"),
            chunks: vec![b"<rss>", b"<channel/>", b"</rss>"],
        };

        let download = fetch_feed(&client, "https://example.com/feed").await.unwrap();

        assert_eq!(&download.bytes[..], b"<rss><channel/></rss>");
        assert_eq!(download.content_type.as_deref(), Some("application/rss+xml"));
    }

    #[tokio::test]
    async fn fetch_feed_fails_on_http_error() {
        let client = MockHttpClient {
            status: 404,
            content_type: None,
            chunks: vec![b"Not Found"],
        };

        match fetch_feed(&client, "https://example.com/feed.xml").await {
            Err(FeedError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn download_is_xml_by_header_or_content() {
        let by_header = FeedDownload {
            bytes: Bytes::from_static(b"whatever"),
            content_type: Some("text/xml".to_string()),
        };
        let by_content = FeedDownload {
            bytes: Bytes::from_static(b"<?xml version=\"1.0\"?><rss/>"),
            content_type: Some("application/octet-stream".to_string()),
        };
        let html = FeedDownload {
            bytes: Bytes::from_static(b"<html></html>"),
            content_type: Some("text/html".to_string()),
        };

        assert!(by_header.is_xml("https://example.com/podcast"));
        assert!(by_content.is_xml("https://example.com/podcast"));
        assert!(!html.is_xml("https://example.com/podcast"));
        assert!(html.is_xml("https://example.com/podcast.xml"));
    }

    #[test]
    fn read_feed_file_reports_missing_file() {
        let dir = tempdir().unwrap();
        let result = read_feed_file(&dir.path().join("missing.xml"));
        assert!(matches!(result, Err(FeedError::FileReadFailed { .. })));
    }
}
