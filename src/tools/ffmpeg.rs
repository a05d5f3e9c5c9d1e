// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Transcoder, check_output};
use crate::error::ToolError;

const DEFAULT_PROGRAM: &str = "ffmpeg";

const AUDIO_BITRATE: &str = "128k";
const SAMPLE_RATE: &str = "44100";

/// Transcoder backed by the ffmpeg executable
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    /// Use `ffmpeg` from the PATH
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Use a specific executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        let args = transcode_args(input, output);
        debug!(program = %self.program, input = %input.display(), "Converting to mp3");

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ToolError::SpawnFailed {
                program: self.program.clone(),
                source: e,
            })?;

        check_output(&self.program, result)?;
        Ok(())
    }
}

/// The output container is forced to mp3 since the target may carry a
/// temporary extension
fn transcode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-loglevel", "error", "-y", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        ["-vn", "-ab", AUDIO_BITRATE, "-ar", SAMPLE_RATE, "-f", "mp3"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}
