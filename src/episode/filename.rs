// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use url::Url;

use crate::feed::Episode;

/// Maximum length for the title portion of a filename
const MAX_TITLE_LENGTH: usize = 100;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "mp4", "aac", "ogg", "opus", "wav", "flac"];

/// Generate a filename stem (without extension) for an episode
///
/// Format: "YYYY-MM-DD-sanitized-title" or "undated-sanitized-title".
/// A title with nothing left after sanitizing is replaced by a hash of the guid.
pub fn generate_filename_stem(episode: &Episode) -> String {
    let date_prefix = episode
        .publication_date
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    let title = sanitize_title(&episode.title);
    if title.is_empty() {
        format!("{date_prefix}-{}", short_hash(&episode.guid))
    } else {
        format!("{date_prefix}-{title}")
    }
}

/// Audio file extension: from the URL path, then the MIME type, else "mp3"
pub fn get_audio_extension(episode: &Episode) -> String {
    episode
        .remote_audio_file_location
        .as_ref()
        .and_then(extension_from_url)
        .or_else(|| episode.audio_mime_type.as_deref().and_then(mime_to_extension))
        .unwrap_or("mp3")
        .to_string()
}

/// Generate a complete filename for an episode (with extension)
pub fn generate_filename(episode: &Episode) -> String {
    format!(
        "{}.{}",
        generate_filename_stem(episode),
        get_audio_extension(episode)
    )
}

/// Filenames for all episodes of a podcast, distinct from each other
///
/// Episodes whose generated names collide get a hash of their guid appended.
/// Names are handed out oldest first, so an episode keeps its name when a
/// newer one with the same title and date shows up. Returned in input order.
pub fn generate_unique_filenames(episodes: &[Episode]) -> Vec<String> {
    let mut used = HashSet::with_capacity(episodes.len());
    let mut names = vec![String::new(); episodes.len()];

    for (i, episode) in episodes.iter().enumerate().rev() {
        let mut name = generate_filename(episode);
        if used.contains(&name) {
            let stem = format!("{}-{}", generate_filename_stem(episode), short_hash(&episode.guid));
            let extension = get_audio_extension(episode);
            name = format!("{stem}.{extension}");

            let mut counter = 2;
            while used.contains(&name) {
                name = format!("{stem}-{counter}.{extension}");
                counter += 1;
            }
        }
        used.insert(name.clone());
        names[i] = name;
    }

    names
}

/// Directory or file name for a podcast, safe on every platform.
/// Podcasts sharing a name are told apart by a hash of their feed location.
pub fn podcast_dir_name(podcast_name: &str, feed_location: &str) -> String {
    let name = sanitize_filename::sanitize(podcast_name.trim());
    let name = if name.is_empty() { "untitled" } else { name.as_str() };
    format!("{name}-{}", short_hash(feed_location))
}

/// First 8 hex digits of the SHA-256 of `value`
fn short_hash(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Keep ASCII letters, digits, `_` and `.`; everything else becomes a
/// single dash. Long titles are cut at a dash when one is close to the limit.
fn sanitize_title(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            sanitized.push(c);
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }

    let trimmed = sanitized.trim_matches('-');
    if trimmed.len() <= MAX_TITLE_LENGTH {
        return trimmed.to_string();
    }

    let cut = &trimmed[..MAX_TITLE_LENGTH];
    match cut.rfind('-') {
        Some(pos) if pos > MAX_TITLE_LENGTH / 2 => cut[..pos].to_string(),
        _ => cut.trim_end_matches('-').to_string(),
    }
}

fn extension_from_url(url: &Url) -> Option<&'static str> {
    let file_name = url.path_segments()?.next_back()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    AUDIO_EXTENSIONS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(ext))
        .copied()
}

fn mime_to_extension(mime: &str) -> Option<&'static str> {
    match mime.trim().to_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}
