// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::episode::{DownloadContext, DownloadResult, download_episode};
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Options for the download queue
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Maximum number of concurrent downloads
    pub max_concurrent: usize,
    /// How often a transient failure is retried
    pub retries: u32,
    /// Wait before the first retry; grows linearly with each attempt
    pub retry_delay: Duration,
    /// Keep starting downloads after one has failed
    pub continue_on_error: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retries: 2,
            retry_delay: Duration::from_secs(2),
            continue_on_error: true,
        }
    }
}

/// One episode to fetch and where to put it
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub episode: Episode,
    pub audio_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CompletedDownload {
    pub episode: Episode,
    pub audio_path: PathBuf,
    pub result: DownloadResult,
}

/// Result of running the queue
#[derive(Debug, Clone, Default)]
pub struct QueueResult {
    pub completed: Vec<CompletedDownload>,
    /// Details of failed episodes (title, error message)
    pub failed_episodes: Vec<(String, String)>,
    /// Jobs never started because an earlier one failed
    pub not_started: usize,
}

/// Download jobs with at most `max_concurrent` in flight
///
/// Jobs start in order. A pool of slot ids doubles as the concurrency limit
/// and as stable ids for progress display.
pub async fn download_all<C: HttpClient + Clone + 'static>(
    client: &C,
    jobs: Vec<DownloadJob>,
    options: &QueueOptions,
    reporter: SharedProgressReporter,
) -> QueueResult {
    let max_concurrent = options.max_concurrent.max(1);
    let total_to_download = jobs.len();

    let (slot_tx, mut slot_rx) = tokio::sync::mpsc::channel(max_concurrent);
    for slot in 0..max_concurrent {
        let _ = slot_tx.send(slot).await;
    }

    let aborted = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(total_to_download);
    let mut not_started = 0;

    for (episode_index, job) in jobs.into_iter().enumerate() {
        let Some(download_id) = slot_rx.recv().await else {
            break;
        };

        if aborted.load(Ordering::SeqCst) {
            not_started = total_to_download - episode_index;
            break;
        }

        let slot_tx = slot_tx.clone();
        let client = client.clone();
        let reporter = reporter.clone();
        let aborted = aborted.clone();
        let options = options.clone();
        let title = job.episode.title.clone();

        let handle = tokio::spawn(async move {
            let context = DownloadContext {
                download_id,
                episode_index,
                total_to_download,
            };

            let outcome = download_with_retries(&client, &job, &context, &options, &reporter).await;

            let outcome = match outcome {
                Ok(result) => Ok(CompletedDownload {
                    episode: job.episode,
                    audio_path: job.audio_path,
                    result,
                }),
                Err(message) => {
                    reporter.report(ProgressEvent::DownloadFailed {
                        download_id,
                        episode_title: job.episode.title.clone(),
                        error: message.clone(),
                    });
                    if !options.continue_on_error {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    Err(message)
                }
            };

            // Return slot to the pool when done
            let _ = slot_tx.send(download_id).await;

            outcome
        });

        handles.push((title, handle));
    }

    let mut result = QueueResult {
        not_started,
        ..Default::default()
    };

    for (title, handle) in handles {
        match handle.await {
            Ok(Ok(completed)) => result.completed.push(completed),
            Ok(Err(message)) => result.failed_episodes.push((title, message)),
            Err(e) => result.failed_episodes.push((title, format!("download task failed: {e}"))),
        }
    }

    debug!(
        completed = result.completed.len(),
        failed = result.failed_episodes.len(),
        not_started = result.not_started,
        "download queue drained"
    );

    result
}

async fn download_with_retries<C: HttpClient>(
    client: &C,
    job: &DownloadJob,
    context: &DownloadContext,
    options: &QueueOptions,
    reporter: &SharedProgressReporter,
) -> Result<DownloadResult, String> {
    let mut attempt = 0;
    loop {
        match download_episode(client, &job.episode, &job.audio_path, context, reporter).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < options.retries => {
                attempt += 1;
                warn!(episode = %job.episode.title, attempt, error = %e, "retrying download");
                reporter.report(ProgressEvent::DownloadRetrying {
                    download_id: context.download_id,
                    episode_title: job.episode.title.clone(),
                    attempt,
                    error: e.to_string(),
                });
                tokio::time::sleep(options.retry_delay * attempt).await;
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}
