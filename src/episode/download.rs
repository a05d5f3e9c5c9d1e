use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::error::DownloadError;
use crate::playlist::EpisodeRecord;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::tools::{Extractor, Transcoder};

use super::filename::AUDIO_EXTENSION;

/// Position of a download within the current show's queue
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Index of this episode in the download queue
    pub episode_index: usize,
    /// Total number of episodes to download
    pub total_to_download: usize,
}

/// Result of a successful download and transcode
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Final mp3 path
    pub audio_path: PathBuf,
    /// Size of the mp3 in bytes
    pub bytes_written: u64,
    /// SHA-256 hash of the mp3 (format: "sha256:hex")
    pub content_hash: String,
}

/// Download an episode and convert it to mp3
///
/// `base_path` is the episode's path without extension. The extractor writes
/// the selected format there, the transcoder writes `{base}.mp3.partial`
/// which is renamed into place once complete. The intermediate download is
/// removed afterwards.
pub async fn download_episode<E, T>(
    extractor: &E,
    transcoder: &T,
    record: &EpisodeRecord,
    base_path: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
) -> Result<DownloadResult, DownloadError>
where
    E: Extractor + ?Sized,
    T: Transcoder + ?Sized,
{
    reporter.report(ProgressEvent::DownloadStarting {
        episode_id: record.episode_id.clone(),
        episode_title: record.title.clone(),
        episode_index: context.episode_index,
        total_to_download: context.total_to_download,
    });

    let progress_reporter = reporter.clone();
    let episode_id = record.episode_id.clone();
    let on_progress = move |bytes_downloaded: u64, total_bytes: Option<u64>| {
        progress_reporter.report(ProgressEvent::DownloadProgress {
            episode_id: episode_id.clone(),
            bytes_downloaded,
            total_bytes,
        });
    };

    extractor
        .download(
            &record.webpage_url,
            &record.best_format,
            base_path,
            &on_progress,
        )
        .await
        .map_err(|e| DownloadError::FetchFailed {
            url: record.webpage_url.clone(),
            source: e,
        })?;

    if !tokio::fs::try_exists(base_path).await.unwrap_or(false) {
        return Err(DownloadError::MissingOutput(base_path.to_path_buf()));
    }

    reporter.report(ProgressEvent::Transcoding {
        episode_id: record.episode_id.clone(),
    });

    let audio_path = with_suffix(base_path, &format!(".{AUDIO_EXTENSION}"));
    let partial_path = with_suffix(base_path, &format!(".{AUDIO_EXTENSION}.partial"));

    if let Err(e) = transcoder.transcode(base_path, &partial_path).await {
        let _ = tokio::fs::remove_file(&partial_path).await;
        return Err(DownloadError::TranscodeFailed {
            path: base_path.to_path_buf(),
            source: e,
        });
    }

    tokio::fs::rename(&partial_path, &audio_path)
        .await
        .map_err(|e| DownloadError::FinalizeFailed {
            path: audio_path.clone(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::remove_file(base_path).await {
        warn!(path = %base_path.display(), error = %e, "Could not remove intermediate download");
    }

    let (bytes_written, content_hash) =
        hash_file(&audio_path)
            .await
            .map_err(|e| DownloadError::FinalizeFailed {
                path: audio_path.clone(),
                source: e,
            })?;
    debug!(path = %audio_path.display(), bytes_written, %content_hash, "Episode ready");

    reporter.report(ProgressEvent::DownloadCompleted {
        episode_id: record.episode_id.clone(),
        episode_title: record.title.clone(),
        bytes_written,
    });

    Ok(DownloadResult {
        audio_path,
        bytes_written,
        content_hash,
    })
}

/// Append a suffix to the full file name, keeping any dots already in it
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn hash_file(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((total, format!("sha256:{:x}", hasher.finalize())))
}
