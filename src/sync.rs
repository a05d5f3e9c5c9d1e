// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::{Config, MainConfig, ShowConfig};
use crate::episode::{DownloadContext, audio_filename, download_episode};
use crate::error::{HistoryError, ShowError};
use crate::feed::publish_feed;
use crate::history::History;
use crate::metadata::{EpisodeMetadata, metadata_path_for, write_episode_metadata};
use crate::playlist::{
    ListingOptions, approximate_age, fetch_playlists, resolve_episodes, select_episodes,
};
use crate::progress::{ProgressEvent, SharedProgressReporter, SkipReason};
use crate::schedule::{DueStatus, check_due};
use crate::state::{create_download_plan, scan_output_dir};
use crate::tools::{Extractor, Transcoder};

/// Result of processing one show
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowResult {
    /// Episodes downloaded and transcoded in this run
    pub downloaded: usize,
    /// Episodes published before the show's start timestamp
    pub before_start: usize,
    /// Episodes already present in the output directory
    pub already_present: usize,
    /// Items in the regenerated feed
    pub feed_entries: usize,
}

/// Result of a whole run over the configured shows
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Shows whose pipeline ran to completion
    pub processed: usize,
    /// Shows skipped because their schedule was not due
    pub not_due: usize,
    /// Shows whose pipeline failed
    pub failed: usize,
    /// Episodes downloaded over all shows
    pub downloaded: usize,
    /// Failed shows with their errors
    pub failures: Vec<(String, ShowError)>,
}

/// Process every configured show that is due
///
/// Shows run one after another in configuration order. A failing show is
/// logged and does not stop the others; its history entry is left alone.
/// Only failing to persist the history aborts the run.
pub async fn run_shows<E, T, C>(
    config: &Config,
    history: &mut History,
    extractor: &E,
    transcoder: &T,
    selected_show: Option<&str>,
    reporter: SharedProgressReporter,
    clock: C,
) -> Result<RunSummary, HistoryError>
where
    E: Extractor + ?Sized,
    T: Transcoder + ?Sized,
    C: Fn() -> DateTime<Utc>,
{
    let mut summary = RunSummary::default();

    for show in &config.shows {
        let now = clock();
        let forced = selected_show == Some(show.id.as_str());

        let status = match check_due(&show.cron, history.get(&show.id), now, forced) {
            Ok(status) => status,
            Err(e) => {
                error!(show = %show.id, error = %e, "Cannot evaluate schedule");
                summary.failed += 1;
                summary.failures.push((show.id.clone(), e.into()));
                continue;
            }
        };

        match status {
            DueStatus::NotYet { next } => {
                info!(show = %show.id, %next, "Show not due yet");
                summary.not_due += 1;
                continue;
            }
            DueStatus::Never => {
                warn!(show = %show.id, cron = %show.cron, "Schedule has no further occurrences");
                summary.not_due += 1;
                continue;
            }
            DueStatus::Forced => info!(show = %show.id, "Processing selected show"),
            DueStatus::FirstRun => info!(show = %show.id, "Processing show for the first time"),
            DueStatus::Due { next } => info!(show = %show.id, %next, "Processing show"),
        }

        match process_show(show, &config.main, extractor, transcoder, &reporter, now).await {
            Ok(result) => {
                history.set(&show.id, now.fixed_offset())?;
                summary.processed += 1;
                summary.downloaded += result.downloaded;
            }
            Err(e) => {
                error!(show = %show.id, error = %e, "Show processing failed");
                summary.failed += 1;
                summary.failures.push((show.id.clone(), e));
            }
        }
    }

    Ok(summary)
}

/// Run the full pipeline for one show
///
/// 1. Scans the output directory (cleaning stale partial files)
/// 2. Lists the show's playlists and selects the latest matching entries
/// 3. Resolves their full metadata
/// 4. Downloads and transcodes what is new, writing a manifest for each
/// 5. Regenerates the show's feed
///
/// Any download or transcode failure aborts the show before its feed is
/// published; files completed earlier stay on disk.
pub async fn process_show<E, T>(
    show: &ShowConfig,
    main: &MainConfig,
    extractor: &E,
    transcoder: &T,
    reporter: &SharedProgressReporter,
    now: DateTime<Utc>,
) -> Result<ShowResult, ShowError>
where
    E: Extractor + ?Sized,
    T: Transcoder + ?Sized,
{
    reporter.report(ProgressEvent::ShowStarting {
        show_id: show.id.clone(),
        title: show.title.clone(),
    });

    let state = scan_output_dir(&main.podcast_dir)?;
    if state.partial_files_cleaned > 0 {
        reporter.report(ProgressEvent::PartialFilesCleanedUp {
            count: state.partial_files_cleaned,
        });
    }

    let options = ListingOptions {
        extractor_args: &main.extractor_args,
        approximate: approximate_age,
        now,
    };
    let listing = fetch_playlists(extractor, &show.urls, &options).await;
    let selected = select_episodes(&listing, show.filters.as_deref());
    reporter.report(ProgressEvent::PlaylistListed {
        show_id: show.id.clone(),
        total_entries: listing.len(),
        selected: selected.len(),
    });

    let urls: Vec<String> = selected.iter().map(|entry| entry.url.clone()).collect();
    let records = resolve_episodes(extractor, &urls).await?;

    let plan = create_download_plan(&show.id, show.start_timestamp, &records, &state);
    for record in &plan.before_start {
        info!(episode = %record.episode_id, date = %record.pub_date, "Skipping episode published before start");
        reporter.report(ProgressEvent::EpisodeSkipped {
            episode_id: record.episode_id.clone(),
            title: record.title.clone(),
            reason: SkipReason::BeforeStart,
        });
    }
    for record in &plan.already_present {
        info!(episode = %record.episode_id, "Skipping already downloaded episode");
        reporter.report(ProgressEvent::EpisodeSkipped {
            episode_id: record.episode_id.clone(),
            title: record.title.clone(),
            reason: SkipReason::AlreadyDownloaded,
        });
    }

    let total_to_download = plan.to_download.len();
    for (episode_index, planned) in plan.to_download.iter().enumerate() {
        info!(episode = %planned.record.episode_id, title = %planned.record.title, "Downloading episode");

        let context = DownloadContext {
            episode_index,
            total_to_download,
        };
        let base_path = main.podcast_dir.join(&planned.stem);

        let result = match download_episode(
            extractor,
            transcoder,
            planned.record,
            &base_path,
            &context,
            reporter,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                reporter.report(ProgressEvent::DownloadFailed {
                    episode_id: planned.record.episode_id.clone(),
                    episode_title: planned.record.title.clone(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let metadata = EpisodeMetadata::from_record(
            &show.id,
            planned.record,
            &audio_filename(&planned.stem),
            Some(result.content_hash),
        );
        write_episode_metadata(&metadata, &metadata_path_for(&result.audio_path))?;
    }

    let published = publish_feed(show, main, &records, now)?;
    reporter.report(ProgressEvent::FeedPublished {
        show_id: show.id.clone(),
        entries: published.entries,
    });

    Ok(ShowResult {
        downloaded: total_to_download,
        before_start: plan.before_start.len(),
        already_present: plan.already_present.len(),
        feed_entries: published.entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::progress::NoopReporter;
    use crate::tools::DownloadProgressFn;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves canned listings and metadata, "downloads" fixed bytes
    #[derive(Default)]
    struct MockExtractor {
        listings: HashMap<String, String>,
        metadata: HashMap<String, String>,
        downloads: Mutex<Vec<String>>,
    }

    impl MockExtractor {
        fn with_episode(mut self, playlist: &str, id: &str, date: &str, formats: &[&str]) -> Self {
            let url = format!("https://www.youtube.com/watch?v={id}");
            let listing_line = serde_json::json!({
                "id": id,
                "title": format!("Episode {id}"),
                "url": url.clone(),
                "upload_date": date,
            });
            let listing = self.listings.entry(playlist.to_string()).or_default();
            listing.push_str(&listing_line.to_string());
            listing.push('\n');

            let formats: Vec<_> = formats
                .iter()
                .map(|f| serde_json::json!({ "format_id": f }))
                .collect();
            let full = serde_json::json!({
                "id": id,
                "title": format!("Episode {id}"),
                "description": format!("About {id}"),
                "webpage_url": url.clone(),
                "upload_date": date,
                "formats": formats,
            });
            self.metadata.insert(url, full.to_string());
            self
        }

        fn downloaded(&self) -> Vec<String> {
            self.downloads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Extractor for MockExtractor {
        async fn flat_listing(&self, url: &str, _args: &[String]) -> Result<String, ToolError> {
            self.listings.get(url).cloned().ok_or_else(|| ToolError::Failed {
                program: "mock".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("no such playlist {url}"),
            })
        }

        async fn dump_metadata(&self, urls: &[String]) -> Result<String, ToolError> {
            Ok(urls
                .iter()
                .filter_map(|url| self.metadata.get(url))
                .cloned()
                .collect::<Vec<_>>()
                .join("\n"))
        }

        async fn download(
            &self,
            url: &str,
            _format_id: &str,
            output: &Path,
            progress: DownloadProgressFn<'_>,
        ) -> Result<(), ToolError> {
            self.downloads.lock().unwrap().push(url.to_string());
            std::fs::write(output, b"media").unwrap();
            progress(5, Some(5));
            Ok(())
        }
    }

    struct MockTranscoder {
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for MockTranscoder {
        async fn transcode(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
            if self.fail {
                return Err(ToolError::Failed {
                    program: "mock".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "broken".to_string(),
                });
            }
            let mut data = std::fs::read(input).unwrap();
            data.extend_from_slice(b" as mp3");
            std::fs::write(output, data).unwrap();
            Ok(())
        }
    }

    fn main_config(dir: &Path) -> MainConfig {
        MainConfig {
            base_public_url: "https://pods.example.com/".to_string(),
            podcast_dir: dir.join("pods"),
            history_file: dir.join("history"),
            extractor: "yt-dlp".to_string(),
            transcoder: "ffmpeg".to_string(),
            extractor_args: Vec::new(),
        }
    }

    fn show_config(id: &str, playlist: &str) -> ShowConfig {
        ShowConfig {
            id: id.to_string(),
            title: format!("Show {id}"),
            description: format!("All about {id}"),
            urls: vec![playlist.to_string()],
            cron: "0 3 * * *".to_string(),
            start_timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            filters: None,
            image_url: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn downloads_new_episodes_and_publishes_feed() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let show = show_config("show1", "pl1");
        let extractor = MockExtractor::default()
            .with_episode("pl1", "old", "20240501", &["140"])
            .with_episode("pl1", "new", "20240701", &["251", "18"]);
        let transcoder = MockTranscoder { fail: false };

        let result = process_show(
            &show,
            &main,
            &extractor,
            &transcoder,
            &NoopReporter::shared(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            ShowResult {
                downloaded: 1,
                before_start: 1,
                already_present: 0,
                feed_entries: 1,
            }
        );
        assert_eq!(extractor.downloaded(), vec!["https://www.youtube.com/watch?v=new"]);

        let pods = &main.podcast_dir;
        assert_eq!(
            std::fs::read(pods.join("show1-20240701-new.mp3")).unwrap(),
            b"media as mp3"
        );
        assert!(!pods.join("show1-20240701-new").exists());
        assert!(!pods.join("show1-20240501-old.mp3").exists());

        let manifest =
            crate::metadata::read_episode_metadata(&pods.join("show1-20240701-new.json")).unwrap();
        assert_eq!(manifest.format_id, "251");
        assert!(manifest.content_hash.unwrap().starts_with("sha256:"));

        let feed = std::fs::read(pods.join("show1.xml")).unwrap();
        let channel = rss::Channel::read_from(&feed[..]).unwrap();
        assert_eq!(channel.items().len(), 1);
        assert_eq!(channel.items()[0].title(), Some("Episode new"));
    }

    #[tokio::test]
    async fn second_run_skips_downloaded_episodes() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let show = show_config("show1", "pl1");
        let extractor =
            MockExtractor::default().with_episode("pl1", "new", "20240701", &["140"]);
        let transcoder = MockTranscoder { fail: false };
        let reporter = NoopReporter::shared();

        process_show(&show, &main, &extractor, &transcoder, &reporter, now())
            .await
            .unwrap();
        let second = process_show(&show, &main, &extractor, &transcoder, &reporter, now())
            .await
            .unwrap();

        assert_eq!(second.downloaded, 0);
        assert_eq!(second.already_present, 1);
        assert_eq!(second.feed_entries, 1);
        assert_eq!(extractor.downloaded().len(), 1);
    }

    #[tokio::test]
    async fn video_in_two_playlists_is_downloaded_once() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let mut show = show_config("show1", "pl1");
        show.urls.push("pl2".to_string());
        let extractor = MockExtractor::default()
            .with_episode("pl1", "dup", "20240701", &["140"])
            .with_episode("pl2", "dup", "20240701", &["140"]);
        let transcoder = MockTranscoder { fail: false };

        let result = process_show(
            &show,
            &main,
            &extractor,
            &transcoder,
            &NoopReporter::shared(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(result.downloaded, 1);
        assert_eq!(result.already_present, 1);
        assert_eq!(result.feed_entries, 1);
        assert_eq!(extractor.downloaded(), vec!["https://www.youtube.com/watch?v=dup"]);
    }

    #[tokio::test]
    async fn missing_audio_format_aborts_show() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let show = show_config("show1", "pl1");
        let extractor = MockExtractor::default()
            .with_episode("pl1", "good", "20240701", &["140"])
            .with_episode("pl1", "video", "20240702", &["137"]);
        let transcoder = MockTranscoder { fail: false };

        let result = process_show(
            &show,
            &main,
            &extractor,
            &transcoder,
            &NoopReporter::shared(),
            now(),
        )
        .await;

        assert!(matches!(result, Err(ShowError::Extract(_))));
        assert!(extractor.downloaded().is_empty());
        assert!(!main.podcast_dir.join("show1.xml").exists());
    }

    #[tokio::test]
    async fn transcode_failure_skips_feed() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let show = show_config("show1", "pl1");
        let extractor =
            MockExtractor::default().with_episode("pl1", "new", "20240701", &["140"]);
        let transcoder = MockTranscoder { fail: true };

        let result = process_show(
            &show,
            &main,
            &extractor,
            &transcoder,
            &NoopReporter::shared(),
            now(),
        )
        .await;

        assert!(matches!(result, Err(ShowError::Download(_))));
        assert!(!main.podcast_dir.join("show1.xml").exists());
        assert!(!main.podcast_dir.join("show1-20240701-new.mp3").exists());
    }

    #[tokio::test]
    async fn run_skips_shows_that_are_not_due() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let config = Config {
            main: main.clone(),
            shows: vec![show_config("fresh", "pl1"), show_config("recent", "pl2")],
        };
        let extractor = MockExtractor::default()
            .with_episode("pl1", "a", "20240701", &["140"])
            .with_episode("pl2", "b", "20240701", &["140"]);
        let transcoder = MockTranscoder { fail: false };

        let mut history = History::load(&main.history_file).unwrap();
        // ran an hour ago, next 03:00 is tomorrow
        let last_run = Utc
            .with_ymd_and_hms(2024, 8, 1, 11, 0, 0)
            .unwrap()
            .fixed_offset();
        history.set("recent", last_run).unwrap();

        let summary = run_shows(
            &config,
            &mut history,
            &extractor,
            &transcoder,
            None,
            NoopReporter::shared(),
            now,
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.not_due, 1);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(history.get("fresh"), Some(now().fixed_offset()));
        assert_eq!(history.get("recent"), Some(last_run));
        assert_eq!(extractor.downloaded(), vec!["https://www.youtube.com/watch?v=a"]);
    }

    #[tokio::test]
    async fn selected_show_bypasses_schedule() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let config = Config {
            main: main.clone(),
            shows: vec![show_config("recent", "pl1")],
        };
        let extractor = MockExtractor::default().with_episode("pl1", "a", "20240701", &["140"]);
        let transcoder = MockTranscoder { fail: false };

        let mut history = History::load(&main.history_file).unwrap();
        let last_run = now().fixed_offset();
        history.set("recent", last_run).unwrap();

        let summary = run_shows(
            &config,
            &mut history,
            &extractor,
            &transcoder,
            Some("recent"),
            NoopReporter::shared(),
            now,
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.not_due, 0);
    }

    #[tokio::test]
    async fn failed_show_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let config = Config {
            main: main.clone(),
            shows: vec![show_config("broken", "pl1"), show_config("fine", "pl2")],
        };
        let extractor = MockExtractor::default()
            .with_episode("pl1", "video", "20240701", &["137"])
            .with_episode("pl2", "b", "20240701", &["140"]);
        let transcoder = MockTranscoder { fail: false };
        let mut history = History::load(&main.history_file).unwrap();

        let summary = run_shows(
            &config,
            &mut history,
            &extractor,
            &transcoder,
            None,
            NoopReporter::shared(),
            now,
        )
        .await
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].0, "broken");
        assert_eq!(history.get("broken"), None);
        assert!(history.get("fine").is_some());
        assert!(main.podcast_dir.join("fine.xml").exists());
    }

    #[tokio::test]
    async fn history_keeps_utc_offset() {
        let dir = tempdir().unwrap();
        let main = main_config(dir.path());
        let config = Config {
            main: main.clone(),
            shows: vec![show_config("show1", "pl1")],
        };
        let extractor = MockExtractor::default();
        let transcoder = MockTranscoder { fail: false };
        let mut history = History::load(&main.history_file).unwrap();

        run_shows(
            &config,
            &mut history,
            &extractor,
            &transcoder,
            None,
            NoopReporter::shared(),
            now,
        )
        .await
        .unwrap();

        let reloaded = History::load(&main.history_file).unwrap();
        let stored = reloaded.get("show1").unwrap();
        assert_eq!(stored, now().fixed_offset());
        assert_eq!(stored.offset(), &FixedOffset::east_opt(0).unwrap());
    }
}
