mod download;
mod filename;
mod state;

pub use download::{DownloadContext, DownloadResult, download_episode, partial_path};
pub use filename::{
    generate_filename, generate_filename_stem, generate_unique_filenames, get_audio_extension,
    podcast_dir_name,
};
pub use state::{AudioDirState, DownloadPlan, PlannedEpisode, create_download_plan, scan_audio_dir};
