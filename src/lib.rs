pub mod collection;
pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod library;
pub mod progress;
pub mod queue;
pub mod store;

// Re-export main types for convenience
pub use collection::{Collection, Upsert};
pub use config::Config;
pub use episode::{
    generate_filename, generate_filename_stem, generate_unique_filenames, get_audio_extension,
};
pub use error::{CollectionError, DownloadError, FeedError, LibraryError, StoreError};
pub use feed::{Episode, Podcast, fetch_feed, is_xml, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use library::{DownloadSummary, Library, UpdateOutcome};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use queue::{QueueOptions, download_all};
pub use store::{EpisodeEntity, EpisodeStore};
