// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::DownloadError;
use crate::feed::Episode;

use super::download::PARTIAL_SUFFIX;
use super::filename::generate_unique_filenames;

/// Contents of a podcast's audio directory
#[derive(Debug, Clone)]
pub struct AudioDirState {
    /// Filenames (without path) of existing files
    pub existing_files: HashSet<String>,
    pub audio_dir: PathBuf,
    /// Number of partial files that were cleaned up during scan
    pub partial_files_cleaned: usize,
}

/// An episode together with the file its audio goes to
#[derive(Debug, Clone)]
pub struct PlannedEpisode {
    pub episode: Episode,
    /// Filename (without path), unique within the podcast
    pub filename: String,
}

/// Which episodes still need downloading
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub to_download: Vec<PlannedEpisode>,
    pub already_present: Vec<PlannedEpisode>,
    /// Episodes without an audio enclosure; never downloadable
    pub without_audio: usize,
}

/// Scan an audio directory, creating it if needed
///
/// Leftover `.partial` files from interrupted downloads are deleted.
pub fn scan_audio_dir(audio_dir: &Path) -> Result<AudioDirState, DownloadError> {
    let mut existing_files = HashSet::new();
    let mut partial_files_cleaned = 0;

    std::fs::create_dir_all(audio_dir).map_err(|e| DownloadError::CreateDirectoryFailed {
        path: audio_dir.to_path_buf(),
        source: e,
    })?;

    let read_failed = |e| DownloadError::ReadDirectoryFailed {
        path: audio_dir.to_path_buf(),
        source: e,
    };

    for entry in std::fs::read_dir(audio_dir).map_err(read_failed)? {
        let path = entry.map_err(read_failed)?.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if filename.ends_with(PARTIAL_SUFFIX) {
            if std::fs::remove_file(&path).is_ok() {
                partial_files_cleaned += 1;
            }
            continue;
        }

        existing_files.insert(filename.to_string());
    }

    Ok(AudioDirState {
        existing_files,
        audio_dir: audio_dir.to_path_buf(),
        partial_files_cleaned,
    })
}

/// Split episodes into those to download and those already on disk.
/// Feed order (newest first) is kept.
pub fn create_download_plan(episodes: &[Episode], state: &AudioDirState) -> DownloadPlan {
    let mut to_download = Vec::new();
    let mut already_present = Vec::new();
    let mut without_audio = 0;

    let filenames = generate_unique_filenames(episodes);

    for (episode, filename) in episodes.iter().zip(filenames) {
        let planned = PlannedEpisode {
            episode: episode.clone(),
            filename,
        };
        if episode.remote_audio_file_location.is_none() {
            without_audio += 1;
        } else if state.existing_files.contains(&planned.filename) {
            already_present.push(planned);
        } else {
            to_download.push(planned);
        }
    }

    DownloadPlan {
        to_download,
        already_present,
        without_audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use url::Url;

    fn make_episode(title: &str, audio: bool) -> Episode {
        Episode {
            guid: title.to_string(),
            title: title.to_string(),
            remote_audio_file_location: audio
                .then(|| Url::parse("https://example.com/ep.mp3").unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn scan_creates_missing_dir() {
        let dir = tempdir().unwrap();
        let audio_dir = dir.path().join("Show");

        let state = scan_audio_dir(&audio_dir).unwrap();

        assert!(audio_dir.is_dir());
        assert!(state.existing_files.is_empty());
        assert_eq!(state.partial_files_cleaned, 0);
    }

    #[test]
    fn scan_cleans_up_partial_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp3.partial"), b"partial").unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"complete").unwrap();

        let state = scan_audio_dir(dir.path()).unwrap();

        assert_eq!(state.partial_files_cleaned, 1);
        assert!(!dir.path().join("a.mp3.partial").exists());
        assert!(state.existing_files.contains("b.mp3"));
        assert!(!state.existing_files.contains("a.mp3.partial"));
    }

    #[test]
    fn plan_skips_present_and_audio_less_episodes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("undated-Present.mp3"), b"x").unwrap();
        let state = scan_audio_dir(dir.path()).unwrap();

        let episodes = vec![
            make_episode("New", true),
            make_episode("Present", true),
            make_episode("Text", false),
        ];
        let plan = create_download_plan(&episodes, &state);

        assert_eq!(plan.to_download.len(), 1);
        assert_eq!(plan.to_download[0].episode.title, "New");
        assert_eq!(plan.to_download[0].filename, "undated-New.mp3");
        assert_eq!(plan.already_present.len(), 1);
        assert_eq!(plan.without_audio, 1);
    }

    #[test]
    fn plan_gives_same_titled_episodes_separate_files() {
        let dir = tempdir().unwrap();
        let state = scan_audio_dir(dir.path()).unwrap();

        let mut newer = make_episode("Bonus", true);
        newer.guid = "bonus-2".to_string();
        let mut older = make_episode("Bonus", true);
        older.guid = "bonus-1".to_string();

        let plan = create_download_plan(&[newer, older], &state);

        assert_eq!(plan.to_download.len(), 2);
        assert_ne!(plan.to_download[0].filename, plan.to_download[1].filename);
        assert_eq!(plan.to_download[1].filename, "undated-Bonus.mp3");
    }
}
