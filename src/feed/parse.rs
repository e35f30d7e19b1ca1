// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use tracing::debug;
use url::Url;

use crate::error::FeedError;

use super::model::{Episode, Podcast};
use super::sniff::guess_content_type_from_name;

const RSS: &str = "rss";
const CHANNEL: &str = "channel";
const PODCAST_NAME: &str = "title";
const PODCAST_DESCRIPTION: &str = "description";
const PODCAST_SUMMARY_ITUNES: &str = "itunes:summary";
const PODCAST_COVER: &str = "image";
const PODCAST_COVER_URL: &str = "url";
const PODCAST_COVER_ITUNES: &str = "itunes:image";
const PODCAST_COVER_ITUNES_URL: &str = "href";
const EPISODE: &str = "item";
const EPISODE_GUID: &str = "guid";
const EPISODE_TITLE: &str = "title";
const EPISODE_DESCRIPTION: &str = "description";
const EPISODE_PUBLICATION_DATE: &str = "pubDate";
const EPISODE_AUDIO_LINK: &str = "enclosure";
const EPISODE_AUDIO_LINK_URL: &str = "url";
const EPISODE_AUDIO_LINK_TYPE: &str = "type";

/// Parse RSS feed XML bytes into a Podcast
///
/// Walks `rss > channel > item` with a pull cursor and maps a fixed set of
/// elements onto the model; unknown elements are skipped with their subtree.
/// Episodes come back newest first, with the podcast name and cover copied in.
pub fn parse_feed(xml_bytes: &[u8], remote_feed_location: &str) -> Result<Podcast, FeedError> {
    let mut cursor = FeedCursor::new(xml_bytes);

    let root = cursor.root()?;
    if root.name != RSS {
        return Err(FeedError::NotRss { found: root.name });
    }

    let mut podcast = None;
    if !root.empty {
        while let Node::Start(element) = cursor.next_node()? {
            match element.name.as_str() {
                CHANNEL => podcast = Some(read_channel(&mut cursor, &element, remote_feed_location)?),
                _ => cursor.skip(&element)?,
            }
        }
    }

    let mut podcast = podcast.ok_or(FeedError::MissingChannel)?;
    podcast.denormalize_episodes();
    podcast.sort_episodes();

    debug!(
        podcast = %podcast.name,
        episodes = podcast.episodes.len(),
        "parsed feed"
    );

    Ok(podcast)
}

fn read_channel(
    cursor: &mut FeedCursor<'_>,
    channel: &Element,
    remote_feed_location: &str,
) -> Result<Podcast, FeedError> {
    let mut podcast = Podcast::new(remote_feed_location);
    if channel.empty {
        return Ok(podcast);
    }

    while let Node::Start(element) = cursor.next_node()? {
        match element.name.as_str() {
            PODCAST_NAME => podcast.name = decode_entities(&cursor.read_text(&element)?),
            PODCAST_DESCRIPTION => podcast.description = cursor.read_text(&element)?,
            PODCAST_SUMMARY_ITUNES => {
                let summary = cursor.read_text(&element)?;
                if podcast.description.is_empty() {
                    podcast.description = summary;
                }
            }
            PODCAST_COVER_ITUNES => {
                if let Some(url) = element.attribute(PODCAST_COVER_ITUNES_URL).and_then(parse_url) {
                    podcast.remote_image_file_location = Some(url);
                }
                cursor.skip(&element)?;
            }
            PODCAST_COVER => {
                if let Some(url) = read_cover(cursor, &element)? {
                    podcast.remote_image_file_location = Some(url);
                }
            }
            EPISODE => podcast.episodes.push(read_episode(cursor, &element)?),
            _ => cursor.skip(&element)?,
        }
    }

    Ok(podcast)
}

/// Reads `<image><url>...</url></image>`
fn read_cover(cursor: &mut FeedCursor<'_>, image: &Element) -> Result<Option<Url>, FeedError> {
    let mut link = None;
    if image.empty {
        return Ok(link);
    }

    while let Node::Start(element) = cursor.next_node()? {
        match element.name.as_str() {
            PODCAST_COVER_URL => link = parse_url(&cursor.read_text(&element)?),
            _ => cursor.skip(&element)?,
        }
    }

    Ok(link)
}

fn read_episode(cursor: &mut FeedCursor<'_>, item: &Element) -> Result<Episode, FeedError> {
    let mut episode = Episode::default();

    if !item.empty {
        while let Node::Start(element) = cursor.next_node()? {
            match element.name.as_str() {
                EPISODE_GUID => episode.guid = cursor.read_text(&element)?,
                EPISODE_TITLE => episode.title = decode_entities(&cursor.read_text(&element)?),
                EPISODE_DESCRIPTION => episode.description = cursor.read_text(&element)?,
                EPISODE_PUBLICATION_DATE => {
                    episode.publication_date =
                        parse_publication_date(&cursor.read_text(&element)?);
                }
                EPISODE_AUDIO_LINK => {
                    if let Some((url, mime_type)) = read_audio_link(&element) {
                        episode.remote_audio_file_location = Some(url);
                        episode.audio_mime_type = mime_type;
                    }
                    cursor.skip(&element)?;
                }
                _ => cursor.skip(&element)?,
            }
        }
    }

    if episode.guid.is_empty() {
        episode.guid = match &episode.remote_audio_file_location {
            Some(url) => url.to_string(),
            None => episode.title.clone(),
        };
    }

    Ok(episode)
}

/// Audio enclosure URL and its declared type. Enclosures whose type is not
/// audio are ignored; without a type, the URL's file name decides.
fn read_audio_link(enclosure: &Element) -> Option<(Url, Option<String>)> {
    let url = enclosure.attribute(EPISODE_AUDIO_LINK_URL).and_then(parse_url)?;
    let mime_type = enclosure
        .attribute(EPISODE_AUDIO_LINK_TYPE)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    let is_audio = match &mime_type {
        Some(t) => t.to_lowercase().contains("audio"),
        None => guess_content_type_from_name(url.path()).is_some_and(|t| t.starts_with("audio/")),
    };

    is_audio.then_some((url, mime_type))
}

fn parse_url(s: &str) -> Option<Url> {
    let s = s.trim();
    match Url::parse(s) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!(value = s, error = %e, "ignoring unparseable URL in feed");
            None
        }
    }
}

fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Parse a `<pubDate>` value. Feeds are supposed to use RFC 2822 but many
/// don't, so a few common variants are tried as well.
pub fn parse_publication_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt);
    }

    // A wrong weekday makes the RFC 2822 parser bail out
    if let Some((_, rest)) = date_str.split_once(", ")
        && let Ok(dt) = DateTime::parse_from_rfc2822(rest)
    {
        return Some(dt);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt);
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%a, %d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%z",
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Some(dt);
        }
    }

    debug!(value = date_str, "ignoring unparseable publication date");
    None
}

/// A start tag, or a self-closing element (`empty`)
#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    empty: bool,
}

impl Element {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

enum Node {
    Start(Element),
    /// End tag of the element currently being read
    End,
}

/// Pull cursor over feed XML. Namespace prefixes are kept as part of names.
struct FeedCursor<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> FeedCursor<'a> {
    fn new(xml_bytes: &'a [u8]) -> Self {
        Self {
            reader: Reader::from_reader(xml_bytes),
        }
    }

    fn malformed(&self, reason: impl Display) -> FeedError {
        FeedError::Malformed {
            position: self.reader.buffer_position() as u64,
            reason: reason.to_string(),
        }
    }

    fn read(&mut self) -> Result<Event<'a>, FeedError> {
        self.reader.read_event().map_err(|e| self.malformed(e))
    }

    /// Skip the prolog and return the document element
    fn root(&mut self) -> Result<Element, FeedError> {
        loop {
            match self.read()? {
                Event::Start(e) => return self.element(&e, false),
                Event::Empty(e) => return self.element(&e, true),
                Event::Eof => return Err(self.malformed("document has no root element")),
                Event::End(_) => return Err(self.malformed("unexpected end tag before root")),
                _ => {}
            }
        }
    }

    /// Advance to the next child element, or the end of the current one
    fn next_node(&mut self) -> Result<Node, FeedError> {
        loop {
            match self.read()? {
                Event::Start(e) => return Ok(Node::Start(self.element(&e, false)?)),
                Event::Empty(e) => return Ok(Node::Start(self.element(&e, true)?)),
                Event::End(_) => return Ok(Node::End),
                Event::Eof => return Err(self.malformed("unexpected end of document")),
                _ => {}
            }
        }
    }

    /// Consume an element and everything inside it
    fn skip(&mut self, element: &Element) -> Result<(), FeedError> {
        if element.empty {
            return Ok(());
        }

        let mut depth = 1usize;
        loop {
            match self.read()? {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => {
                    return Err(self.malformed(format!("unclosed <{}>", element.name)));
                }
                _ => {}
            }
        }
    }

    /// Read the text content of an element up to its end tag, trimmed.
    /// Nested elements are skipped.
    fn read_text(&mut self, element: &Element) -> Result<String, FeedError> {
        let mut text = String::new();
        if element.empty {
            return Ok(text);
        }

        loop {
            match self.read()? {
                Event::Text(e) => text.push_str(&unescape_text(&e)),
                Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
                Event::Start(e) => {
                    let nested = self.element(&e, false)?;
                    self.skip(&nested)?;
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(self.malformed(format!("unclosed <{}>", element.name)));
                }
                _ => {}
            }
        }

        Ok(text.trim().to_string())
    }

    fn element(&self, start: &BytesStart<'_>, empty: bool) -> Result<Element, FeedError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.malformed(e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => decode_entities(&String::from_utf8_lossy(&attr.value)),
            };
            attributes.push((key, value));
        }

        Ok(Element {
            name,
            attributes,
            empty,
        })
    }
}

/// XML-unescape text. HTML entities such as `&nbsp;` are not valid XML but
/// show up in real feeds, so fall back to HTML decoding for those.
fn unescape_text(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => decode_entities(&String::from_utf8_lossy(text)),
    }
}
