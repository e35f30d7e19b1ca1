// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// Events emitted while feeds are read and episodes downloaded
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed document is being parsed
    ParsingFeed { source: String },

    /// A podcast was added to the collection
    PodcastAdded {
        podcast_name: String,
        episode_count: usize,
    },

    /// A subscribed podcast was re-read and replaced
    PodcastUpdated {
        podcast_name: String,
        episode_count: usize,
    },

    /// Downloads for a podcast have been planned
    DownloadPlanReady {
        podcast_name: String,
        total_episodes: usize,
        new_episodes: usize,
        to_download: usize,
        /// Episodes without an audio enclosure
        without_audio: usize,
    },

    /// A download is starting
    DownloadStarting {
        /// Identifies the download slot (0 to max_concurrent-1)
        download_id: usize,
        episode_title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes to download
        total_to_download: usize,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A failed download is tried again
    DownloadRetrying {
        download_id: usize,
        episode_title: String,
        attempt: u32,
        error: String,
    },

    /// Download is being finalized (renamed from .partial)
    Finalizing {
        download_id: usize,
        episode_title: String,
    },

    /// Hashing completed for a download
    HashingCompleted {
        download_id: usize,
        episode_title: String,
        hash: String,
    },

    /// A download completed successfully
    DownloadCompleted {
        download_id: usize,
        episode_title: String,
        bytes_downloaded: u64,
    },

    /// A download failed for good
    DownloadFailed {
        download_id: usize,
        episode_title: String,
        error: String,
    },

    /// Partial files were cleaned up during directory scan
    PartialFilesCleanedUp { count: usize },

    /// All downloads for a podcast are done
    DownloadsCompleted {
        downloaded_count: usize,
        existing_count: usize,
        limited_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
