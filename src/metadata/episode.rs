use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;
use crate::playlist::EpisodeRecord;

/// Sidecar manifest for a published episode
///
/// Lets the feed be rebuilt for episodes that were downloaded by earlier
/// runs, when the in-memory metadata of the current run does not cover them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub show_id: String,
    pub episode_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub pub_date: DateTime<FixedOffset>,
    pub webpage_url: String,
    pub format_id: String,
    pub audio_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub downloaded_at: DateTime<Utc>,
}

impl EpisodeMetadata {
    /// Create metadata from a resolved record
    pub fn from_record(
        show_id: &str,
        record: &EpisodeRecord,
        audio_filename: &str,
        content_hash: Option<String>,
    ) -> Self {
        Self {
            show_id: show_id.to_string(),
            episode_id: record.episode_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            pub_date: record.pub_date,
            webpage_url: record.webpage_url.clone(),
            format_id: record.best_format.clone(),
            audio_filename: audio_filename.to_string(),
            content_hash,
            downloaded_at: Utc::now(),
        }
    }
}

/// Path of the sidecar belonging to an audio file
pub fn metadata_path_for(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("json")
}

/// Write episode metadata to a JSON file
pub fn write_episode_metadata(metadata: &EpisodeMetadata, path: &Path) -> Result<(), MetadataError> {
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(path, json).map_err(|e| MetadataError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read episode metadata from a JSON file
pub fn read_episode_metadata(path: &Path) -> Result<EpisodeMetadata, MetadataError> {
    let content = std::fs::read_to_string(path).map_err(|e| MetadataError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| MetadataError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
