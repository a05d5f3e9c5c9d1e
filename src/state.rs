use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::episode::{AUDIO_EXTENSION, episode_stem};
use crate::error::StateError;
use crate::playlist::EpisodeRecord;

/// State of the output directory, tracking already-downloaded episodes
#[derive(Debug, Clone)]
pub struct OutputState {
    /// Filenames (without path) of completed audio files
    pub audio_files: BTreeSet<String>,
    /// Number of partial files that were cleaned up during scan
    pub partial_files_cleaned: usize,
}

impl OutputState {
    /// Whether any completed audio file starts with the given stem
    pub fn is_downloaded(&self, stem: &str) -> bool {
        self.audio_files.iter().any(|name| name.starts_with(stem))
    }

    /// Completed audio files belonging to a show, sorted by name
    pub fn show_audio_files<'a>(&'a self, show_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let prefix = format!("{show_id}-");
        self.audio_files
            .iter()
            .filter(move |name| name.starts_with(&prefix))
            .map(String::as_str)
    }
}

/// An episode that passed the dedup filter
#[derive(Debug, Clone)]
pub struct PlannedEpisode<'a> {
    pub record: &'a EpisodeRecord,
    /// Dedup key and filename stem
    pub stem: String,
}

/// Plan for a show's run, indicating what needs to be downloaded
#[derive(Debug, Clone)]
pub struct DownloadPlan<'a> {
    /// Episodes that need to be downloaded, in record order
    pub to_download: Vec<PlannedEpisode<'a>>,
    /// Episodes published before the show's start timestamp
    pub before_start: Vec<&'a EpisodeRecord>,
    /// Episodes already present in the output directory
    pub already_present: Vec<&'a EpisodeRecord>,
}

/// Scan the output directory to detect existing downloads
///
/// Creates the directory when missing. Cleans up any `.partial` files from
/// interrupted transcodes.
pub fn scan_output_dir(output_dir: &Path) -> Result<OutputState, StateError> {
    let mut audio_files = BTreeSet::new();
    let mut partial_files_cleaned = 0;

    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir).map_err(|e| StateError::CreateDirectoryFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        return Ok(OutputState {
            audio_files,
            partial_files_cleaned,
        });
    }

    let entries = std::fs::read_dir(output_dir).map_err(|e| StateError::ReadDirectoryFailed {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let audio_suffix = format!(".{AUDIO_EXTENSION}");

    for entry in entries {
        let entry = entry.map_err(|e| StateError::ReadDirectoryFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if filename.ends_with(".partial") {
            if std::fs::remove_file(&path).is_ok() {
                debug!(path = %path.display(), "Removed stale partial file");
                partial_files_cleaned += 1;
            }
            continue;
        }

        if filename.ends_with(&audio_suffix) {
            audio_files.insert(filename.to_string());
        }
    }

    Ok(OutputState {
        audio_files,
        partial_files_cleaned,
    })
}

/// Split resolved records into what to download and what to skip
///
/// Records before `start` are skipped first; the rest are checked against
/// the files on disk and against the episodes planned earlier in the same
/// batch, so a video listed by several playlists is downloaded once.
pub fn create_download_plan<'a>(
    show_id: &str,
    start: DateTime<Utc>,
    records: &'a [EpisodeRecord],
    state: &OutputState,
) -> DownloadPlan<'a> {
    let mut plan = DownloadPlan {
        to_download: Vec::new(),
        before_start: Vec::new(),
        already_present: Vec::new(),
    };

    let mut planned = HashSet::new();

    for record in records {
        if record.pub_date < start {
            plan.before_start.push(record);
            continue;
        }

        let stem = episode_stem(show_id, &record.pub_date, &record.episode_id);
        if state.is_downloaded(&stem) || planned.contains(&stem) {
            plan.already_present.push(record);
        } else {
            planned.insert(stem.clone());
            plan.to_download.push(PlannedEpisode { record, stem });
        }
    }

    plan
}
