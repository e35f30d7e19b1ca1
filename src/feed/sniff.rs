// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

/// Check whether a user-entered feed address looks like XML
///
/// The address must be an http(s) URL. It is XML when it ends with `xml`
/// or when the content type guessed from its file name is an XML type.
pub fn is_xml(feed_url: &str) -> bool {
    if !is_feed_candidate(feed_url) {
        return false;
    }

    if feed_url.to_lowercase().ends_with("xml") {
        return true;
    }

    mime_type_is_xml(feed_url)
}

/// An http(s) address that parses as a URL. Whether it really is a feed
/// can only be decided after downloading it.
pub fn is_feed_candidate(feed_url: &str) -> bool {
    starts_with_ignore_case(feed_url, "http") && Url::parse(feed_url).is_ok()
}

fn mime_type_is_xml(feed_url: &str) -> bool {
    Url::parse(feed_url)
        .ok()
        .and_then(|url| guess_content_type_from_name(url.path()))
        .is_some_and(content_type_is_xml)
}

/// Guess a MIME type from the extension of a file name or URL path
pub fn guess_content_type_from_name(name: &str) -> Option<&'static str> {
    let file_name = name.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;

    let mime = match ext.to_lowercase().as_str() {
        "xml" | "xsl" => "application/xml",
        "rss" => "application/rss+xml",
        "atom" => "application/atom+xml",
        "rdf" => "application/rdf+xml",
        "htm" | "html" => "text/html",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "mp4" | "m4v" => "video/mp4",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };

    Some(mime)
}

/// Check a `Content-Type` header value for an XML media type
pub fn content_type_is_xml(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media_type| media_type.trim().to_lowercase().contains("xml"))
}

/// Check whether a downloaded body starts like an XML or RSS document
pub fn looks_like_xml(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let bytes = &bytes[start..];

    bytes.starts_with(b"<?xml") || bytes.starts_with(b"<rss")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
