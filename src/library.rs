// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::collection::{Collection, Upsert};
use crate::config::Config;
use crate::episode::{create_download_plan, podcast_dir_name, scan_audio_dir};
use crate::error::LibraryError;
use crate::feed::{Podcast, fetch_feed, guess_content_type_from_name, is_feed_candidate, parse_feed, read_feed_file};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::queue::{DownloadJob, QueueOptions, download_all};
use crate::store::{EpisodeEntity, EpisodeStore};

/// Result of `Library::update_collection`
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The last update is too recent; nothing was fetched
    TooSoon { next_update_in: chrono::Duration },
    Updated {
        updated: usize,
        /// Feed location and error message of podcasts that could not be re-read
        failed: Vec<(String, String)>,
    },
}

/// Result of `Library::download_episodes`
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub existing: usize,
    /// New episodes skipped because of the download limit
    pub limited: usize,
    /// Episodes that have no audio to download
    pub without_audio: usize,
    pub failed_episodes: Vec<(String, String)>,
}

/// A podcast library: the subscribed collection, the episode database and
/// the downloaded audio, all kept under one data directory
pub struct Library<C: HttpClient + Clone + 'static> {
    config: Config,
    client: C,
    collection: Collection,
    store: EpisodeStore,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient + Clone + 'static> Library<C> {
    /// Open the library in `config.data_dir`, creating it on first use
    pub fn open(client: C, config: Config, reporter: SharedProgressReporter) -> Result<Self, LibraryError> {
        for dir in [config.data_dir().to_path_buf(), config.covers_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| LibraryError::CreateDirectoryFailed { path: dir.clone(), source: e })?;
        }

        let collection = Collection::load(&config.collection_path())?;
        let store = EpisodeStore::open(&config.database_path())?;

        debug!(
            data_dir = %config.data_dir().display(),
            podcasts = collection.podcasts.len(),
            "opened library"
        );

        Ok(Self {
            config,
            client,
            collection,
            store,
            reporter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn store(&self) -> &EpisodeStore {
        &self.store
    }

    /// Subscribed podcasts, in the order they were added
    pub fn podcasts(&self) -> &[Podcast] {
        &self.collection.podcasts
    }

    /// Stored episodes of one podcast, or of all podcasts; newest first
    pub fn episodes(&self, query: Option<&str>) -> Result<Vec<EpisodeEntity>, LibraryError> {
        match query {
            Some(query) => {
                let podcast = self.find_podcast(query)?;
                Ok(self.store.find_by_podcast(&podcast.remote_podcast_feed_location)?)
            }
            None => Ok(self.store.get_all()?),
        }
    }

    /// Subscribe to the podcast published at `feed_url`
    pub async fn add_podcast(&mut self, feed_url: &str) -> Result<&Podcast, LibraryError> {
        let feed_url = feed_url.trim();

        if self.collection.is_in_collection(feed_url) {
            return Err(LibraryError::DuplicatePodcast(feed_url.to_string()));
        }
        if !is_feed_candidate(feed_url) {
            return Err(LibraryError::InvalidFeed(feed_url.to_string()));
        }

        let podcast = self.read_remote_feed(feed_url).await?;
        self.ingest(podcast).await?;

        self.find_podcast(feed_url)
    }

    /// Subscribe to a podcast from a feed document on disk.
    ///
    /// Without `feed_location` the podcast is identified by the file's URL.
    pub async fn import_feed_file(
        &mut self,
        path: &Path,
        feed_location: Option<&str>,
    ) -> Result<Upsert, LibraryError> {
        let location = match feed_location {
            Some(location) => location.trim().to_string(),
            None => file_location(path),
        };

        let podcast = self.read_local_feed(path, &location)?;
        self.ingest(podcast).await
    }

    /// Store a freshly parsed podcast.
    ///
    /// The podcast replaces any subscribed one with the same feed location,
    /// as do its rows in the episode database. Audio locations recorded for
    /// episodes that are still in the feed survive.
    pub async fn ingest(&mut self, mut podcast: Podcast) -> Result<Upsert, LibraryError> {
        podcast.local_image_file_location = match self.existing_cover(&podcast) {
            Some(path) => Some(path),
            None => self.download_cover(&podcast).await,
        };

        self.replace_stored_episodes(&podcast)?;

        let podcast_name = podcast.name.clone();
        let episode_count = podcast.episodes.len();

        let upsert = self.collection.upsert(podcast);
        self.collection.save(&self.config.collection_path())?;

        info!(podcast = %podcast_name, episodes = episode_count, ?upsert, "stored podcast");
        self.reporter.report(match upsert {
            Upsert::Added => ProgressEvent::PodcastAdded {
                podcast_name,
                episode_count,
            },
            Upsert::Replaced => ProgressEvent::PodcastUpdated {
                podcast_name,
                episode_count,
            },
        });

        Ok(upsert)
    }

    /// Re-read every subscribed feed, unless the last update is too recent
    pub async fn update_collection(&mut self, force: bool) -> Result<UpdateOutcome, LibraryError> {
        let now = Utc::now();
        let interval = chrono::Duration::from_std(self.config.update_interval).unwrap_or(chrono::Duration::MAX);

        if !force && !self.collection.has_enough_time_passed_since_last_update(now, interval) {
            let since_last = self
                .collection
                .last_update
                .map(|last| now.signed_duration_since(last))
                .unwrap_or(interval);
            return Ok(UpdateOutcome::TooSoon {
                next_update_in: interval - since_last,
            });
        }

        let locations: Vec<String> = self
            .collection
            .podcasts
            .iter()
            .map(|p| p.remote_podcast_feed_location.clone())
            .collect();

        let mut updated = 0;
        let mut failed = Vec::new();

        for location in locations {
            let podcast = match self.read_subscribed_feed(&location).await {
                Ok(podcast) => podcast,
                Err(e) => {
                    warn!(feed = %location, error = %e, "could not update podcast");
                    failed.push((location, e.to_string()));
                    continue;
                }
            };
            if let Err(e) = self.ingest(podcast).await {
                warn!(feed = %location, error = %e, "could not store updated podcast");
                failed.push((location, e.to_string()));
                continue;
            }
            updated += 1;
        }

        self.collection.last_update = Some(now);
        self.collection.save(&self.config.collection_path())?;

        Ok(UpdateOutcome::Updated { updated, failed })
    }

    /// Download episodes of a podcast that are not on disk yet, newest first.
    ///
    /// `limit` caps how many new episodes are fetched in this run.
    pub async fn download_episodes(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<DownloadSummary, LibraryError> {
        let podcast = self.find_podcast(query)?;
        let audio_dir = self.config.audio_dir(podcast);

        let state = scan_audio_dir(&audio_dir)?;
        if state.partial_files_cleaned > 0 {
            self.reporter.report(ProgressEvent::PartialFilesCleanedUp {
                count: state.partial_files_cleaned,
            });
        }

        let mut plan = create_download_plan(&podcast.episodes, &state);
        let new_episodes = plan.to_download.len();
        let limited = match limit {
            Some(limit) if limit < new_episodes => {
                plan.to_download.truncate(limit);
                new_episodes - limit
            }
            _ => 0,
        };

        self.reporter.report(ProgressEvent::DownloadPlanReady {
            podcast_name: podcast.name.clone(),
            total_episodes: podcast.episodes.len(),
            new_episodes,
            to_download: plan.to_download.len(),
            without_audio: plan.without_audio,
        });

        for present in &plan.already_present {
            self.record_audio_location(&present.episode.guid, &audio_dir.join(&present.filename), None)?;
        }

        let jobs: Vec<DownloadJob> = plan
            .to_download
            .into_iter()
            .map(|planned| DownloadJob {
                audio_path: audio_dir.join(&planned.filename),
                episode: planned.episode,
            })
            .collect();
        let attempted = jobs.len();

        let options = QueueOptions {
            max_concurrent: self.config.max_concurrent,
            retries: self.config.retries,
            ..Default::default()
        };
        let result = download_all(&self.client, jobs, &options, self.reporter.clone()).await;

        for completed in &result.completed {
            self.record_audio_location(
                &completed.episode.guid,
                &completed.audio_path,
                Some(&completed.result.content_hash),
            )?;
        }

        self.reporter.report(ProgressEvent::DownloadsCompleted {
            downloaded_count: result.completed.len(),
            existing_count: plan.already_present.len(),
            limited_count: limited,
            failed_count: result.failed_episodes.len(),
        });

        if attempted > 0 && result.completed.is_empty() {
            return Err(LibraryError::AllDownloadsFailed);
        }

        Ok(DownloadSummary {
            downloaded: result.completed.len(),
            existing: plan.already_present.len(),
            limited,
            without_audio: plan.without_audio,
            failed_episodes: result.failed_episodes,
        })
    }

    /// Unsubscribe from a podcast and forget its episodes.
    /// Downloaded audio stays on disk.
    pub fn remove_podcast(&mut self, query: &str) -> Result<Podcast, LibraryError> {
        let podcast = self
            .collection
            .remove(query)
            .ok_or_else(|| LibraryError::UnknownPodcast(query.to_string()))?;

        let removed = self.store.delete_by_podcast(&podcast.remote_podcast_feed_location)?;
        self.collection.save(&self.config.collection_path())?;

        info!(podcast = %podcast.name, episodes = removed, "removed podcast");
        Ok(podcast)
    }

    fn find_podcast(&self, query: &str) -> Result<&Podcast, LibraryError> {
        self.collection
            .find(query)
            .ok_or_else(|| LibraryError::UnknownPodcast(query.to_string()))
    }

    async fn read_remote_feed(&self, url: &str) -> Result<Podcast, LibraryError> {
        self.reporter.report(ProgressEvent::FetchingFeed {
            url: url.to_string(),
        });
        let download = fetch_feed(&self.client, url).await?;

        if !download.is_xml(url) {
            return Err(LibraryError::InvalidFeed(url.to_string()));
        }

        self.reporter.report(ProgressEvent::ParsingFeed {
            source: url.to_string(),
        });
        Ok(parse_feed(&download.bytes, url)?)
    }

    fn read_local_feed(&self, path: &Path, location: &str) -> Result<Podcast, LibraryError> {
        self.reporter.report(ProgressEvent::ParsingFeed {
            source: path.display().to_string(),
        });
        let bytes = read_feed_file(path)?;
        Ok(parse_feed(&bytes, location)?)
    }

    /// Remote feeds are fetched again; imported ones are re-read from disk
    async fn read_subscribed_feed(&self, location: &str) -> Result<Podcast, LibraryError> {
        if is_feed_candidate(location) {
            return self.read_remote_feed(location).await;
        }

        let path = Url::parse(location)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(location));
        self.read_local_feed(&path, location)
    }

    fn replace_stored_episodes(&self, podcast: &Podcast) -> Result<(), LibraryError> {
        let location = &podcast.remote_podcast_feed_location;

        let previous: HashMap<String, EpisodeEntity> = self
            .store
            .find_by_podcast(location)?
            .into_iter()
            .map(|entity| (entity.guid.clone(), entity))
            .collect();

        let entities: Vec<EpisodeEntity> = podcast
            .episodes
            .iter()
            .map(|episode| {
                let mut entity = EpisodeEntity::from_episode(episode, podcast);
                if let Some(old) = previous.get(&entity.guid) {
                    entity.eid = old.eid;
                    entity.local_audio_file_location = old.local_audio_file_location.clone();
                    entity.content_hash = old.content_hash.clone();
                }
                entity
            })
            .collect();

        self.store.replace_podcast_episodes(location, &entities)?;
        Ok(())
    }

    fn record_audio_location(
        &self,
        guid: &str,
        path: &Path,
        content_hash: Option<&str>,
    ) -> Result<(), LibraryError> {
        self.store
            .set_local_audio_location(guid, &path.to_string_lossy(), content_hash)?;
        Ok(())
    }

    /// The cover downloaded for the subscribed podcast, if the feed still points at it
    fn existing_cover(&self, podcast: &Podcast) -> Option<PathBuf> {
        let existing = self.collection.find(&podcast.remote_podcast_feed_location)?;
        if existing.remote_image_file_location != podcast.remote_image_file_location {
            return None;
        }
        existing
            .local_image_file_location
            .clone()
            .filter(|path| path.exists())
    }

    async fn download_cover(&self, podcast: &Podcast) -> Option<PathBuf> {
        let url = podcast.remote_image_file_location.as_ref()?;
        let path = self.config.covers_dir().join(format!(
            "{}.{}",
            podcast_dir_name(&podcast.name, &podcast.remote_podcast_feed_location),
            cover_extension(url)
        ));

        let bytes = match self.client.get_bytes(url.as_str()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(podcast = %podcast.name, url = %url, error = %e, "could not download cover");
                return None;
            }
        };

        match tokio::fs::write(&path, &bytes).await {
            Ok(()) => {
                debug!(path = %path.display(), "saved cover");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not save cover");
                None
            }
        }
    }
}

fn cover_extension(url: &Url) -> &'static str {
    match guess_content_type_from_name(url.path()) {
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        _ => "jpg",
    }
}

/// `file://` URL of a local feed, or its plain path when it has none
fn file_location(path: &Path) -> String {
    std::path::absolute(path)
        .ok()
        .and_then(|absolute| Url::from_file_path(absolute).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::http::{ByteStream, HttpResponse};
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::{TempDir, tempdir};

    const FEED_URL: &str = "https://example.com/feed";

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Escape Pod</title>
    <description>Science fiction stories</description>
    <itunes:image href="https://example.com/cover.png"/>
    <item>
      <title>Older Story</title>
      <guid>ep-1</guid>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/1.mp3" type="audio/mpeg" length="5"/>
    </item>
    <item>
      <title>Newer Story</title>
      <guid>ep-2</guid>
      <pubDate>Tue, 02 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/2.mp3" type="audio/mpeg" length="5"/>
    </item>
  </channel>
</rss>"#;

    const NEWS_FEED_URL: &str = "https://example.com/news/feed";

    /// Same-day items whose titles have no ASCII, plus one without audio
    const NEWS_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Show</title>
    <item>
      <title>ニュース</title>
      <guid>a</guid>
      <pubDate>Mon, 01 Jan 2024 08:00:00 +0000</pubDate>
      <enclosure url="https://example.com/news/a.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>インタビュー</title>
      <guid>b</guid>
      <pubDate>Mon, 01 Jan 2024 09:00:00 +0000</pubDate>
      <enclosure url="https://example.com/news/b.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Show notes</title>
      <guid>c</guid>
      <pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    #[derive(Default)]
    struct CollectingReporter {
        events: std::sync::Mutex<Vec<ProgressEvent>>,
    }

    impl crate::progress::ProgressReporter for CollectingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[derive(Clone)]
    struct Route {
        status: u16,
        content_type: Option<&'static str>,
        body: Bytes,
    }

    /// Serves fixed responses by URL; anything else is a 404
    #[derive(Clone, Default)]
    struct MockHttpClient {
        routes: Arc<HashMap<String, Route>>,
        requests: Arc<AtomicUsize>,
    }

    impl MockHttpClient {
        fn with_routes(routes: Vec<(&str, Route)>) -> Self {
            Self {
                routes: Arc::new(routes.into_iter().map(|(url, r)| (url.to_string(), r)).collect()),
                requests: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn route(&self, url: &str) -> Route {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.routes.get(url).cloned().unwrap_or(Route {
                status: 404,
                content_type: None,
                body: Bytes::new(),
            })
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(self.route(url).body)
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            let route = self.route(url);
            let body = route.body.clone();
            let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(body) }));

            Ok(HttpResponse {
                status: route.status,
                content_length: Some(route.body.len() as u64),
                content_type: route.content_type.map(String::from),
                body: stream,
            })
        }
    }

    fn ok(content_type: &'static str, body: &'static [u8]) -> Route {
        Route {
            status: 200,
            content_type: Some(content_type),
            body: Bytes::from_static(body),
        }
    }

    fn podcast_server() -> MockHttpClient {
        MockHttpClient::with_routes(vec![
            (FEED_URL, ok("application/rss+xml", FEED.as_bytes())),
            ("https://example.com/cover.png", ok("image/png", b"png")),
            ("https://example.com/1.mp3", ok("audio/mpeg", b"one..")),
            ("https://example.com/2.mp3", ok("audio/mpeg", b"two..")),
            ("https://example.com/page", ok("text/html", b"<html><body/></html>")),
            (NEWS_FEED_URL, ok("application/rss+xml", NEWS_FEED.as_bytes())),
            ("https://example.com/news/a.mp3", ok("audio/mpeg", b"aaaaa")),
            ("https://example.com/news/b.mp3", ok("audio/mpeg", b"bbbbb")),
        ])
    }

    fn open_library(dir: &TempDir, client: MockHttpClient) -> Library<MockHttpClient> {
        Library::open(client, Config::new(dir.path()), NoopReporter::shared()).unwrap()
    }

    #[tokio::test]
    async fn add_podcast_stores_podcast_episodes_and_cover() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());

        let podcast = library.add_podcast(FEED_URL).await.unwrap();
        assert_eq!(podcast.name, "Escape Pod");
        assert_eq!(podcast.episodes[0].title, "Newer Story");

        let cover = podcast.local_image_file_location.clone().unwrap();
        let cover_name = format!("{}.png", podcast_dir_name("Escape Pod", FEED_URL));
        assert_eq!(cover, dir.path().join("covers").join(cover_name));
        assert_eq!(std::fs::read(&cover).unwrap(), b"png");

        let stored = library.episodes(Some("escape pod")).unwrap();
        let titles: Vec<_> = stored.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Newer Story", "Older Story"]);

        let reloaded = Collection::load(&dir.path().join("collection.json")).unwrap();
        assert_eq!(reloaded.podcasts.len(), 1);
    }

    #[tokio::test]
    async fn add_podcast_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();

        let result = library.add_podcast("https://example.com/feed/").await;
        assert!(matches!(result, Err(LibraryError::DuplicatePodcast(_))));
        assert_eq!(library.podcasts().len(), 1);
    }

    #[tokio::test]
    async fn add_podcast_rejects_addresses_that_are_not_feeds() {
        let dir = tempdir().unwrap();
        let client = podcast_server();
        let mut library = open_library(&dir, client.clone());

        let result = library.add_podcast("escape pod").await;
        assert!(matches!(result, Err(LibraryError::InvalidFeed(_))));
        assert_eq!(client.requests.load(Ordering::SeqCst), 0);

        let result = library.add_podcast("https://example.com/page").await;
        assert!(matches!(result, Err(LibraryError::InvalidFeed(_))));

        let result = library.add_podcast("https://example.com/gone.xml").await;
        assert!(matches!(
            result,
            Err(LibraryError::Feed(crate::error::FeedError::HttpStatus { status: 404, .. }))
        ));

        assert!(library.podcasts().is_empty());
    }

    #[tokio::test]
    async fn import_feed_file_identifies_podcast_by_file_url() {
        let dir = tempdir().unwrap();
        let feed_path = dir.path().join("escape-pod.xml");
        std::fs::write(&feed_path, FEED).unwrap();
        let mut library = open_library(&dir, podcast_server());

        let upsert = library.import_feed_file(&feed_path, None).await.unwrap();
        assert_eq!(upsert, Upsert::Added);

        let podcast = &library.podcasts()[0];
        assert!(podcast.remote_podcast_feed_location.starts_with("file://"));
        assert_eq!(library.episodes(None).unwrap().len(), 2);

        let upsert = library.import_feed_file(&feed_path, None).await.unwrap();
        assert_eq!(upsert, Upsert::Replaced);
        assert_eq!(library.podcasts().len(), 1);
    }

    #[tokio::test]
    async fn update_collection_is_throttled_unless_forced() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();

        match library.update_collection(false).await.unwrap() {
            UpdateOutcome::Updated { updated, failed } => {
                assert_eq!(updated, 1);
                assert!(failed.is_empty());
            }
            other => panic!("expected an update, got {other:?}"),
        }
        assert!(library.collection().last_update.is_some());

        assert!(matches!(
            library.update_collection(false).await.unwrap(),
            UpdateOutcome::TooSoon { .. }
        ));
        assert!(matches!(
            library.update_collection(true).await.unwrap(),
            UpdateOutcome::Updated { updated: 1, .. }
        ));
    }

    #[tokio::test]
    async fn update_collection_collects_failures() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();

        let mut gone = Podcast::new("https://example.com/gone.xml");
        gone.name = "Gone".to_string();
        library.ingest(gone).await.unwrap();

        match library.update_collection(true).await.unwrap() {
            UpdateOutcome::Updated { updated, failed } => {
                assert_eq!(updated, 1);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, "https://example.com/gone.xml");
            }
            other => panic!("expected an update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_episodes_records_audio_locations() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();

        let summary = library.download_episodes("Escape Pod", None).await.unwrap();
        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.existing, 0);

        for entity in library.episodes(None).unwrap() {
            let location = entity.local_audio_file_location.unwrap();
            assert!(Path::new(&location).exists());
        }

        let summary = library.download_episodes("Escape Pod", None).await.unwrap();
        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.existing, 2);
    }

    #[tokio::test]
    async fn download_episodes_stores_content_hash() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();
        library.download_episodes("Escape Pod", None).await.unwrap();

        let entity = library.store().find_by_guid("ep-1").unwrap().unwrap();
        let hash = entity.content_hash.unwrap();
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 64);

        library.update_collection(true).await.unwrap();
        let entity = library.store().find_by_guid("ep-1").unwrap().unwrap();
        assert_eq!(entity.content_hash, Some(hash));
    }

    #[tokio::test]
    async fn episodes_with_untranslatable_titles_get_their_own_files() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(NEWS_FEED_URL).await.unwrap();

        let summary = library.download_episodes("Show", None).await.unwrap();
        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.without_audio, 1);

        let a = library.store().find_by_guid("a").unwrap().unwrap();
        let b = library.store().find_by_guid("b").unwrap().unwrap();
        let a_path = a.local_audio_file_location.unwrap();
        let b_path = b.local_audio_file_location.unwrap();
        assert_ne!(a_path, b_path);
        assert_eq!(std::fs::read(&a_path).unwrap(), b"aaaaa");
        assert_eq!(std::fs::read(&b_path).unwrap(), b"bbbbb");

        let summary = library.download_episodes("Show", None).await.unwrap();
        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.existing, 2);
    }

    #[tokio::test]
    async fn download_plan_reports_episodes_without_audio() {
        let dir = tempdir().unwrap();
        let reporter = Arc::new(CollectingReporter::default());
        let mut library =
            Library::open(podcast_server(), Config::new(dir.path()), reporter.clone()).unwrap();
        library.add_podcast(NEWS_FEED_URL).await.unwrap();

        library.download_episodes("Show", None).await.unwrap();

        let events = reporter.events.lock().unwrap();
        let plan = events.iter().find_map(|event| match event {
            ProgressEvent::DownloadPlanReady {
                without_audio,
                to_download,
                ..
            } => Some((*without_audio, *to_download)),
            _ => None,
        });
        assert_eq!(plan, Some((1, 2)));
    }

    #[tokio::test]
    async fn podcasts_sharing_a_name_keep_separate_covers_and_audio() {
        let dir = tempdir().unwrap();
        let feed_path = dir.path().join("copy.xml");
        std::fs::write(&feed_path, FEED.replace("ep-", "copy-")).unwrap();
        let mut library = open_library(&dir, podcast_server());

        library.add_podcast(FEED_URL).await.unwrap();
        library.import_feed_file(&feed_path, None).await.unwrap();

        let covers: Vec<_> = library
            .podcasts()
            .iter()
            .map(|p| p.local_image_file_location.clone().unwrap())
            .collect();
        assert_ne!(covers[0], covers[1]);
        assert_ne!(
            library.config().audio_dir(&library.podcasts()[0]),
            library.config().audio_dir(&library.podcasts()[1])
        );
    }

    #[tokio::test]
    async fn update_collection_tries_every_podcast_when_storing_fails() {
        let dir = tempdir().unwrap();
        let feed_path = dir.path().join("copy.xml");
        std::fs::write(&feed_path, FEED.replace("ep-", "copy-")).unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();
        library.import_feed_file(&feed_path, None).await.unwrap();

        let locations: Vec<_> = library
            .podcasts()
            .iter()
            .map(|p| p.remote_podcast_feed_location.clone())
            .collect();
        for location in &locations {
            library.store().delete_by_podcast(location).unwrap();
        }

        // Saving the collection goes through this temp file
        std::fs::create_dir(dir.path().join("collection.json.tmp")).unwrap();

        let result = library.update_collection(true).await;
        assert!(matches!(result, Err(LibraryError::Collection(_))));

        for location in &locations {
            assert_eq!(library.store().find_by_podcast(location).unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn download_episodes_honors_limit() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();

        let summary = library.download_episodes(FEED_URL, Some(1)).await.unwrap();
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.limited, 1);

        let newest = library.store().find_by_guid("ep-2").unwrap().unwrap();
        assert!(newest.local_audio_file_location.is_some());
        let oldest = library.store().find_by_guid("ep-1").unwrap().unwrap();
        assert!(oldest.local_audio_file_location.is_none());
    }

    #[tokio::test]
    async fn update_keeps_audio_locations() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();
        library.download_episodes("Escape Pod", None).await.unwrap();

        library.update_collection(true).await.unwrap();

        let entity = library.store().find_by_guid("ep-1").unwrap().unwrap();
        assert!(entity.local_audio_file_location.is_some());
    }

    #[tokio::test]
    async fn download_episodes_of_unknown_podcast_fails() {
        let dir = tempdir().unwrap();
        let library = open_library(&dir, podcast_server());

        let result = library.download_episodes("Nothing", None).await;
        assert!(matches!(result, Err(LibraryError::UnknownPodcast(_))));
    }

    #[tokio::test]
    async fn remove_podcast_forgets_episodes() {
        let dir = tempdir().unwrap();
        let mut library = open_library(&dir, podcast_server());
        library.add_podcast(FEED_URL).await.unwrap();

        let removed = library.remove_podcast("Escape Pod").unwrap();
        assert_eq!(removed.name, "Escape Pod");
        assert!(library.podcasts().is_empty());
        assert!(library.episodes(None).unwrap().is_empty());

        assert!(matches!(
            library.remove_podcast("Escape Pod"),
            Err(LibraryError::UnknownPodcast(_))
        ));
    }

    #[tokio::test]
    async fn library_reopens_with_saved_state() {
        let dir = tempdir().unwrap();
        {
            let mut library = open_library(&dir, podcast_server());
            library.add_podcast(FEED_URL).await.unwrap();
        }

        let library = open_library(&dir, podcast_server());
        assert_eq!(library.podcasts().len(), 1);
        assert_eq!(library.episodes(None).unwrap().len(), 2);
    }
}
