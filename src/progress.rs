use std::sync::Arc;

/// Why an episode was not downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Published before the show's start timestamp
    BeforeStart,
    /// An audio file with the episode's dedup key already exists
    AlreadyDownloaded,
}

/// Events emitted while processing shows, for transient console output
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Processing of a show begins
    ShowStarting { show_id: String, title: String },

    /// Playlists were listed and filtered
    PlaylistListed {
        show_id: String,
        total_entries: usize,
        selected: usize,
    },

    /// An episode was left out of the download plan
    EpisodeSkipped {
        episode_id: String,
        title: String,
        reason: SkipReason,
    },

    /// A download is starting
    DownloadStarting {
        episode_id: String,
        episode_title: String,
        /// Index of this episode in the download queue
        episode_index: usize,
        /// Total number of episodes to download
        total_to_download: usize,
    },

    /// Download progress update
    DownloadProgress {
        episode_id: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// Download finished, conversion to mp3 started
    Transcoding { episode_id: String },

    /// An episode is downloaded and transcoded
    DownloadCompleted {
        episode_id: String,
        episode_title: String,
        bytes_written: u64,
    },

    /// A download or transcode failed
    DownloadFailed {
        episode_id: String,
        episode_title: String,
        error: String,
    },

    /// Partial files were cleaned up during directory scan
    PartialFilesCleanedUp { count: usize },

    /// The show's feed was regenerated
    FeedPublished { show_id: String, entries: usize },
}

/// Trait for reporting progress events during a run.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
