// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{DownloadProgressFn, Extractor, check_output};
use crate::error::ToolError;

const DEFAULT_PROGRAM: &str = "yt-dlp";

/// Marker prefixed to our progress lines so they can be told apart from
/// anything else the extractor prints
const PROGRESS_MARKER: &str = "yt2pod-progress";

/// Extractor backed by the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    /// Use `yt-dlp` from the PATH
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Use a specific executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> ToolError {
        ToolError::SpawnFailed {
            program: self.program.clone(),
            source,
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn flat_listing(
        &self,
        url: &str,
        extractor_args: &[String],
    ) -> Result<String, ToolError> {
        let args = flat_listing_args(url, extractor_args);
        debug!(program = %self.program, ?args, "Listing playlist");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        // Unavailable entries make yt-dlp exit non-zero even though the rest
        // of the listing is fine
        if !output.status.success() && !output.stdout.is_empty() {
            warn!(
                %url,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Playlist listing finished with errors, using partial output"
            );
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let output = check_output(&self.program, output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn dump_metadata(&self, urls: &[String]) -> Result<String, ToolError> {
        let args = dump_metadata_args(urls);
        debug!(program = %self.program, count = urls.len(), "Dumping episode metadata");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let output = check_output(&self.program, output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn download(
        &self,
        url: &str,
        format_id: &str,
        output: &Path,
        progress: DownloadProgressFn<'_>,
    ) -> Result<(), ToolError> {
        let args = download_args(url, format_id, output);
        debug!(program = %self.program, ?args, "Downloading media");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // stderr is drained alongside stdout so a chatty child cannot block
        let read_progress = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    if let Some((downloaded, total)) = parse_progress_line(&line) {
                        progress(downloaded, total);
                    }
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };

        let (progress_read, stderr_read) = tokio::join!(read_progress, read_stderr);
        progress_read.map_err(|e| self.spawn_error(e))?;
        let stderr = stderr_read.map_err(|e| self.spawn_error(e))?;
        let status = child.wait().await.map_err(|e| self.spawn_error(e))?;

        check_output(
            &self.program,
            std::process::Output {
                status,
                stdout: Vec::new(),
                stderr,
            },
        )?;
        Ok(())
    }
}

fn flat_listing_args(url: &str, extractor_args: &[String]) -> Vec<String> {
    let mut args: Vec<String> = ["--flat-playlist", "--dump-json", "--ignore-errors", "--no-warnings"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for value in extractor_args {
        args.push("--extractor-args".to_string());
        args.push(value.clone());
    }
    args.push(url.to_string());
    args
}

fn dump_metadata_args(urls: &[String]) -> Vec<String> {
    let mut args: Vec<String> = ["--dump-json", "--skip-download", "--no-warnings", "--no-playlist"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.extend(urls.iter().cloned());
    args
}

fn download_args(url: &str, format_id: &str, output: &Path) -> Vec<String> {
    // not --quiet: in quiet mode progress lines move to stderr
    vec![
        "--no-warnings".to_string(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        format!(
            "download:{PROGRESS_MARKER} %(progress.downloaded_bytes)s \
             %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
        ),
        "--format".to_string(),
        format_id.to_string(),
        "--output".to_string(),
        escape_output_template(&output.to_string_lossy()),
        url.to_string(),
    ]
}

/// yt-dlp treats `%` in output paths as template fields
fn escape_output_template(path: &str) -> String {
    path.replace('%', "%%")
}

/// Parse a progress line into (downloaded, total) bytes
///
/// The total prefers the exact size and falls back to the estimate;
/// yt-dlp prints `NA` for unknown values.
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace().map(parse_byte_count);

    let downloaded = fields.next()??;
    let total = fields.next().flatten();
    let estimate = fields.next().flatten();

    Some((downloaded, total.or(estimate)))
}

fn parse_byte_count(field: &str) -> Option<u64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value as u64)
}
