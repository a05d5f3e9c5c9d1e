pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod history;
pub mod metadata;
pub mod playlist;
pub mod progress;
pub mod schedule;
pub mod state;
pub mod sync;
pub mod tools;

// Re-export main types for convenience
pub use config::{Config, MainConfig, ShowConfig, load_config, parse_config};
pub use error::{
    ConfigError, DownloadError, ExtractError, FeedError, HistoryError, MetadataError,
    ScheduleError, ShowError, StateError, ToolError,
};
pub use history::History;
pub use progress::{
    NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter, SkipReason,
};
pub use schedule::{DueStatus, check_due};
pub use sync::{RunSummary, ShowResult, process_show, run_shows};
pub use tools::{Extractor, Ffmpeg, Transcoder, YtDlp};
