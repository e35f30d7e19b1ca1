// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Suffix of files still being downloaded
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Context for tracking a download in concurrent scenarios
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Slot ID (0 to max_concurrent-1) for progress bar management
    pub download_id: usize,
    /// Index of this episode in the download queue
    pub episode_index: usize,
    /// Total number of episodes to download
    pub total_to_download: usize,
}

/// Outcome of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub bytes_downloaded: u64,
    /// "sha256:<hex>"
    pub content_hash: String,
}

/// Download an episode's audio to `output_path`
///
/// The body is streamed into `<output_path>.partial` and hashed on the way;
/// the file only gets its final name once everything has been written.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    episode: &Episode,
    output_path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadResult, DownloadError> {
    let url = episode
        .remote_audio_file_location
        .as_ref()
        .ok_or_else(|| DownloadError::NoAudio {
            title: episode.title.clone(),
        })?
        .as_str();

    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
        content_length: response.content_length,
    });

    let partial_path = partial_path(output_path);
    let write_failed = |e| DownloadError::FileWriteFailed {
        path: partial_path.clone(),
        source: e,
    };

    let mut file = File::create(&partial_path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: partial_path.clone(),
            source: e,
        })?;

    let mut hasher = Sha256::new();
    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk).await.map_err(write_failed)?;
        hasher.update(&chunk);
        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            download_id: context.download_id,
            episode_title: episode.title.clone(),
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush().await.map_err(write_failed)?;
    drop(file);

    reporter.report(ProgressEvent::Finalizing {
        download_id: context.download_id,
        episode_title: episode.title.clone(),
    });

    tokio::fs::rename(&partial_path, output_path)
        .await
        .map_err(|e| DownloadError::RenameFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    let content_hash = format!("sha256:{}", to_hex(&hasher.finalize()));
    reporter.report(ProgressEvent::HashingCompleted {
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        hash: content_hash.clone(),
    });

    reporter.report(ProgressEvent::DownloadCompleted {
        download_id: context.download_id,
        episode_title: episode.title.clone(),
        bytes_downloaded,
    });

    debug!(path = %output_path.display(), bytes = bytes_downloaded, "episode saved");

    Ok(DownloadResult {
        bytes_downloaded,
        content_hash,
    })
}

/// Where a download is written before it is complete
pub fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
