// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading and validating the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Bad general config format, must be a mapping")]
    NotAMapping,

    #[error("Missing keys in main config: {}", .0.join(", "))]
    MissingMainKeys(Vec<String>),

    #[error("Missing or malformed 'shows' section")]
    MissingShows,

    #[error("Bad format for show id {0:?} (must be alphanumeric)")]
    InvalidShowId(String),

    #[error("Show id {0:?} is configured more than once")]
    DuplicateShowId(String),

    #[error("Missing keys {} for show id {show_id}", .keys.join(", "))]
    MissingShowKeys { show_id: String, keys: Vec<String> },

    #[error("Invalid value for '{field}' in {section}: {reason}")]
    InvalidField {
        section: String,
        field: String,
        reason: String,
    },

    #[error("Selected show {0:?} is not configured")]
    UnknownShow(String),
}

/// Errors from the recurrence evaluator
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

/// Errors that can occur when reading or writing the history file
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to read history file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed line {line_number} in history file {path}: {line:?}")]
    MalformedLine {
        path: PathBuf,
        line_number: usize,
        line: String,
    },

    #[error("Failed to write history file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while running one of the external tools
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Errors that can occur when interpreting extractor output
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Failed to parse extractor JSON {line:?}: {source}")]
    InvalidJson {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Episode {episode_id} has no usable audio format (available: {})", .available.join(", "))]
    NoAudioFormat {
        episode_id: String,
        available: Vec<String>,
    },

    #[error("Episode {episode_id} is missing field '{field}'")]
    MissingField { episode_id: String, field: String },
}

/// Errors that can occur while downloading and transcoding an episode
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Download of {url} failed: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: ToolError,
    },

    #[error("Transcoding {path} failed: {source}")]
    TranscodeFailed {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("Extractor did not produce expected file {0}")]
    MissingOutput(PathBuf),

    #[error("Failed to finalize {path}: {source}")]
    FinalizeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur during episode manifest operations
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to read metadata file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write metadata file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse metadata JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors that can occur when scanning the output directory
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while publishing a feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to stat audio file {path}: {source}")]
    StatFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render RSS feed: {0}")]
    RenderFailed(#[from] rss::Error),

    #[error("Failed to write feed file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Top-level errors for processing a single show
#[derive(Error, Debug)]
pub enum ShowError {
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}
