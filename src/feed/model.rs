// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use url::Url;

/// A podcast read from an RSS feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Podcast {
    pub name: String,
    pub description: String,
    /// Address the feed was read from; identifies the podcast in a collection
    pub remote_podcast_feed_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_image_file_location: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_image_file_location: Option<PathBuf>,
    /// Newest first
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// A single podcast episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub guid: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_audio_file_location: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_mime_type: Option<String>,
    pub podcast_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<Url>,
}

impl Podcast {
    /// Create an empty podcast for the given feed location
    pub fn new(remote_podcast_feed_location: impl Into<String>) -> Self {
        Self {
            remote_podcast_feed_location: remote_podcast_feed_location.into(),
            ..Default::default()
        }
    }

    /// Sort episodes newest first. Undated episodes go last, keeping feed order.
    pub fn sort_episodes(&mut self) {
        self.episodes
            .sort_by(|a, b| b.publication_date.cmp(&a.publication_date));
    }

    /// Copy podcast name and cover into every episode
    pub fn denormalize_episodes(&mut self) {
        for episode in &mut self.episodes {
            episode.podcast_name = self.name.clone();
            episode.cover = self.remote_image_file_location.clone();
        }
    }
}
