use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use yt2pod::{
    Ffmpeg, History, NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter,
    SkipReason, YtDlp, load_config, run_shows,
};

// Emoji with fallback for terminals without Unicode support
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Turn video playlists into podcast feeds
#[derive(Parser, Debug)]
#[command(name = "yt2pod")]
#[command(about = "Turn video playlists into podcast feeds")]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    config_file: PathBuf,

    /// Process only this show, ignoring its schedule
    #[arg(long)]
    show: Option<String>,

    /// Quiet mode - no progress output, only warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - debug logging, takes precedence over quiet
    #[arg(short, long)]
    verbose: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    download_bar: Mutex<Option<ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new(multi: MultiProgress) -> Self {
        let main_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} {wide_msg}") {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            download_bar: Mutex::new(None),
            main_bar,
        }
    }

    fn with_download_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let Ok(mut slot) = self.download_bar.lock() else {
            return;
        };

        let bar = slot.get_or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(0));
            if let Ok(style) = ProgressStyle::default_bar().template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            )) {
                bar.set_style(style.progress_chars("█▓░"));
            }
            bar
        });
        f(bar);
    }

    fn finish_download_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(mut slot) = self.download_bar.lock()
            && let Some(bar) = slot.take()
        {
            f(&bar);
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ShowStarting { show_id, title } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}{} {}",
                    title.bold().green(),
                    format!("({show_id})").dimmed()
                ));
            }

            ProgressEvent::PlaylistListed {
                show_id,
                total_entries,
                selected,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} listed, {} selected",
                    show_id.bold().green(),
                    total_entries.to_string().cyan(),
                    selected.to_string().yellow()
                ));
            }

            ProgressEvent::EpisodeSkipped { title, reason, .. } => {
                let why = match reason {
                    SkipReason::BeforeStart => "before start",
                    SkipReason::AlreadyDownloaded => "already downloaded",
                };
                self.main_bar.set_message(format!(
                    "{HEADPHONES}Skipping {} ({})",
                    truncate_title(&title, 40),
                    why.dimmed()
                ));
            }

            ProgressEvent::DownloadStarting {
                episode_title,
                episode_index,
                total_to_download,
                ..
            } => {
                self.with_download_bar(|bar| {
                    bar.set_length(0);
                    bar.set_position(0);
                    bar.set_message(format!(
                        "[{}/{}] {}",
                        (episode_index + 1).to_string().cyan(),
                        total_to_download.to_string().cyan(),
                        truncate_title(&episode_title, 40)
                    ));
                });
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                self.with_download_bar(|bar| {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                });
            }

            ProgressEvent::Transcoding { .. } => {
                self.with_download_bar(|bar| {
                    bar.set_message("converting to mp3".dimmed().to_string());
                });
            }

            ProgressEvent::DownloadCompleted { episode_title, .. } => {
                self.finish_download_bar(|bar| {
                    bar.finish_and_clear();
                });
                self.multi
                    .println(format!(
                        "  {SUCCESS}{}",
                        truncate_title(&episode_title, 60).green()
                    ))
                    .ok();
            }

            ProgressEvent::DownloadFailed {
                episode_title,
                error,
                ..
            } => {
                self.finish_download_bar(|bar| {
                    bar.abandon_with_message(format!(
                        "{FAILURE}{} - {}",
                        truncate_title(&episode_title, 30).red(),
                        error.red()
                    ));
                });
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.multi
                    .println(format!(
                        "  Removed {} partial file(s) from an interrupted run",
                        count.to_string().yellow()
                    ))
                    .ok();
            }

            ProgressEvent::FeedPublished { show_id, entries } => {
                self.multi
                    .println(format!(
                        "{SUCCESS}{} feed published with {} episode(s)",
                        show_id.bold().green(),
                        entries.to_string().cyan()
                    ))
                    .ok();
            }
        }
    }
}

impl Drop for IndicatifReporter {
    fn drop(&mut self) {
        self.main_bar.finish_and_clear();
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let truncated: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Log writer that hides the progress bars while a line is printed
#[derive(Clone)]
struct ProgressWriter {
    multi: MultiProgress,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.multi.suspend(|| std::io::stderr().write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.multi.suspend(|| std::io::stderr().flush())
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn default_log_level(args: &Args) -> &'static str {
    if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    }
}

fn init_logging(args: &Args, multi: Option<&MultiProgress>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(args)));

    let registry = tracing_subscriber::registry().with(filter);
    match multi {
        Some(multi) => registry
            .with(fmt::layer().with_writer(ProgressWriter {
                multi: multi.clone(),
            }))
            .init(),
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let multi = (!args.quiet).then(MultiProgress::new);
    init_logging(&args, multi.as_ref());

    let config = load_config(&args.config_file, args.show.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            args.config_file.display()
        )
    })?;
    let mut history = History::load(&config.main.history_file).with_context(|| {
        format!(
            "Failed to load history from {}",
            config.main.history_file.display()
        )
    })?;

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            RADIO,
            "yt2pod".bold().magenta(),
            "- Playlists to Podcasts".dimmed()
        );
    }

    let extractor = YtDlp::with_program(config.main.extractor.clone());
    let transcoder = Ffmpeg::with_program(config.main.transcoder.clone());

    let indicatif = multi.map(|multi| Arc::new(IndicatifReporter::new(multi)));
    let reporter: SharedProgressReporter = match &indicatif {
        Some(reporter) => reporter.clone() as SharedProgressReporter,
        None => NoopReporter::shared(),
    };

    let summary = run_shows(
        &config,
        &mut history,
        &extractor,
        &transcoder,
        args.show.as_deref(),
        reporter,
        Utc::now,
    )
    .await
    .context("Failed to update history")?;
    drop(indicatif);

    if !args.quiet {
        println!(
            "\n{PARTY}{} {} processed, {} not due, {} failed, {} episode(s) downloaded",
            "Run complete:".bold().green(),
            summary.processed.to_string().green().bold(),
            summary.not_due.to_string().yellow(),
            if summary.failed > 0 {
                summary.failed.to_string().red().bold()
            } else {
                summary.failed.to_string().green()
            },
            summary.downloaded.to_string().cyan()
        );

        if !summary.failures.is_empty() {
            println!("\n{}", "Failed shows:".red().bold());
            for (show_id, error) in &summary.failures {
                println!(
                    "  {}{} - {}",
                    CROSS,
                    show_id.yellow(),
                    error.to_string().dimmed()
                );
            }
        }
        println!();
    }

    Ok(())
}
