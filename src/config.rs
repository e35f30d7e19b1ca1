// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::episode::podcast_dir_name;
use crate::feed::Podcast;

const COLLECTION_FILENAME: &str = "collection.json";
const DATABASE_FILENAME: &str = "episodes.db";
const AUDIO_DIRNAME: &str = "audio";
const COVERS_DIRNAME: &str = "covers";

/// Runtime settings and the on-disk layout of the data directory
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Minimum time between two full collection updates
    pub update_interval: Duration,
    /// Maximum number of concurrent downloads
    pub max_concurrent: usize,
    /// How often a failed download is retried
    pub retries: u32,
    /// Connect and read timeout for HTTP requests
    pub http_timeout: Duration,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn collection_path(&self) -> PathBuf {
        self.data_dir.join(COLLECTION_FILENAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.data_dir.join(COVERS_DIRNAME)
    }

    /// Audio directory of one podcast
    pub fn audio_dir(&self, podcast: &Podcast) -> PathBuf {
        self.data_dir.join(AUDIO_DIRNAME).join(podcast_dir_name(
            &podcast.name,
            &podcast.remote_podcast_feed_location,
        ))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("escapepods-data"),
            update_interval: Duration::from_secs(60 * 60),
            max_concurrent: 3,
            retries: 2,
            http_timeout: Duration::from_secs(30),
        }
    }
}
