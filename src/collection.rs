// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollectionError;
use crate::feed::Podcast;

/// The podcasts a user is subscribed to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub podcasts: Vec<Podcast>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// What `Collection::upsert` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Replaced,
}

impl Collection {
    /// Load the collection from a JSON file. A missing file is an empty collection.
    pub fn load(path: &Path) -> Result<Self, CollectionError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(CollectionError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        serde_json::from_str(&content).map_err(|e| CollectionError::JsonParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save the collection as JSON, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<(), CollectionError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");

        let write_failed = |e| CollectionError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        std::fs::write(&tmp_path, json).map_err(write_failed)?;
        std::fs::rename(&tmp_path, path).map_err(write_failed)
    }

    /// Check whether a podcast with this feed location is subscribed
    pub fn is_in_collection(&self, feed_location: &str) -> bool {
        self.position(feed_location).is_some()
    }

    /// Find a podcast by feed location, or by name ignoring case
    pub fn find(&self, query: &str) -> Option<&Podcast> {
        self.position(query)
            .or_else(|| self.position_by_name(query))
            .map(|i| &self.podcasts[i])
    }

    /// Add a podcast, or replace the subscribed one with the same feed location.
    /// A replaced podcast keeps its downloaded cover.
    pub fn upsert(&mut self, mut podcast: Podcast) -> Upsert {
        match self.position(&podcast.remote_podcast_feed_location) {
            Some(i) => {
                let existing = &mut self.podcasts[i];
                if podcast.local_image_file_location.is_none()
                    && podcast.remote_image_file_location == existing.remote_image_file_location
                {
                    podcast.local_image_file_location = existing.local_image_file_location.take();
                }
                *existing = podcast;
                Upsert::Replaced
            }
            None => {
                self.podcasts.push(podcast);
                Upsert::Added
            }
        }
    }

    /// Remove a podcast by feed location or name
    pub fn remove(&mut self, query: &str) -> Option<Podcast> {
        self.position(query)
            .or_else(|| self.position_by_name(query))
            .map(|i| self.podcasts.remove(i))
    }

    /// Whether a full update is due. A collection that was never updated always is.
    pub fn has_enough_time_passed_since_last_update(
        &self,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> bool {
        match self.last_update {
            Some(last) => now.signed_duration_since(last) >= interval,
            None => true,
        }
    }

    fn position(&self, feed_location: &str) -> Option<usize> {
        let wanted = normalize_feed_location(feed_location);
        self.podcasts
            .iter()
            .position(|p| normalize_feed_location(&p.remote_podcast_feed_location) == wanted)
    }

    fn position_by_name(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.podcasts
            .iter()
            .position(|p| p.name.to_lowercase() == wanted)
    }
}

/// Feed locations compare equal regardless of surrounding whitespace,
/// a trailing slash, or the case of the scheme
fn normalize_feed_location(location: &str) -> String {
    let location = location.trim().trim_end_matches('/');
    match location.split_once("://") {
        Some((scheme, rest)) => format!("{}://{}", scheme.to_lowercase(), rest),
        None => location.to_string(),
    }
}
