// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::feed::{Episode, Podcast};

/// A row of the `episode` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeEntity {
    /// Row id; `None` until the row has been inserted
    pub eid: Option<i64>,
    pub guid: String,
    pub title: String,
    pub description: String,
    pub publication_date: Option<DateTime<FixedOffset>>,
    pub remote_audio_file_location: Option<String>,
    pub audio_mime_type: Option<String>,
    pub local_audio_file_location: Option<String>,
    /// "sha256:<hex>" of the downloaded audio
    pub content_hash: Option<String>,
    pub podcast_name: String,
    pub cover: Option<String>,
    pub podcast_feed_location: String,
}

impl EpisodeEntity {
    pub fn from_episode(episode: &Episode, podcast: &Podcast) -> Self {
        Self {
            eid: None,
            guid: episode.guid.clone(),
            title: episode.title.clone(),
            description: episode.description.clone(),
            publication_date: episode.publication_date,
            remote_audio_file_location: episode
                .remote_audio_file_location
                .as_ref()
                .map(|u| u.to_string()),
            audio_mime_type: episode.audio_mime_type.clone(),
            local_audio_file_location: None,
            content_hash: None,
            podcast_name: episode.podcast_name.clone(),
            cover: episode.cover.as_ref().map(|u| u.to_string()),
            podcast_feed_location: podcast.remote_podcast_feed_location.clone(),
        }
    }

    pub(super) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let publication_date: Option<String> = row.get("episode_publication_date")?;
        Ok(Self {
            eid: row.get("eid")?,
            guid: row.get("episode_guid")?,
            title: row.get("episode_title")?,
            description: row.get("episode_description")?,
            publication_date: publication_date
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok()),
            remote_audio_file_location: row.get("episode_remote_audio_location")?,
            audio_mime_type: row.get("episode_audio_mime_type")?,
            local_audio_file_location: row.get("episode_local_audio_location")?,
            content_hash: row.get("episode_content_hash")?,
            podcast_name: row.get("podcast_name")?,
            cover: row.get("podcast_cover")?,
            podcast_feed_location: row.get("podcast_feed_location")?,
        })
    }
}
