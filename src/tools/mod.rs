// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Abstractions over the external programs the pipeline drives.
//!
//! The traits keep the pipeline testable: production code talks to yt-dlp
//! and ffmpeg child processes, tests plug in canned output.

mod ffmpeg;
mod ytdlp;

use std::path::Path;

use async_trait::async_trait;

use crate::error::ToolError;

pub use ffmpeg::Ffmpeg;
pub use ytdlp::YtDlp;

/// Callback receiving bytes downloaded and the total size, when known
pub type DownloadProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Playlist and video metadata extractor (yt-dlp compatible)
#[async_trait]
pub trait Extractor: Send + Sync {
    /// List a playlist without fetching per-item metadata.
    ///
    /// Returns the raw output: one JSON object per line.
    async fn flat_listing(&self, url: &str, extractor_args: &[String])
    -> Result<String, ToolError>;

    /// Dump the full metadata of the given videos, one JSON document per line
    async fn dump_metadata(&self, urls: &[String]) -> Result<String, ToolError>;

    /// Download one format of a video to exactly `output`
    async fn download(
        &self,
        url: &str,
        format_id: &str,
        output: &Path,
        progress: DownloadProgressFn<'_>,
    ) -> Result<(), ToolError>;
}

/// Audio transcoder (ffmpeg compatible)
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` to a 128 kbit/s, 44.1 kHz, audio-only mp3 at `output`
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// Turn a finished child process into a result, keeping stderr for the error
pub(crate) fn check_output(
    program: &str,
    output: std::process::Output,
) -> Result<std::process::Output, ToolError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
