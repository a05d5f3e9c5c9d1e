// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::error::HistoryError;

/// Persisted "last successful run" timestamps, one per show
///
/// The file holds one `<show_id> <RFC 3339 timestamp>` line per show,
/// sorted by show id, and is rewritten in full on every update.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
    entries: BTreeMap<String, DateTime<FixedOffset>>,
}

impl History {
    /// Load the history file, starting empty if it does not exist yet
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let mut entries = BTreeMap::new();

        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| HistoryError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;

            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }

                let (show_id, timestamp) =
                    parse_line(line).ok_or_else(|| HistoryError::MalformedLine {
                        path: path.to_path_buf(),
                        line_number: index + 1,
                        line: line.to_string(),
                    })?;
                entries.insert(show_id, timestamp);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Last successful processing time of a show, if any
    pub fn get(&self, show_id: &str) -> Option<DateTime<FixedOffset>> {
        self.entries.get(show_id).copied()
    }

    /// Record a processing time and persist the whole file immediately
    pub fn set(
        &mut self,
        show_id: &str,
        last_run: DateTime<FixedOffset>,
    ) -> Result<(), HistoryError> {
        self.entries.insert(show_id.to_string(), last_run);
        self.save()
    }

    fn save(&self) -> Result<(), HistoryError> {
        let content: String = self
            .entries
            .iter()
            .map(|(show_id, last_run)| format!("{} {}\n", show_id, last_run.to_rfc3339()))
            .collect();

        write_atomic(&self.path, content.as_bytes()).map_err(|e| HistoryError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}

fn parse_line(line: &str) -> Option<(String, DateTime<FixedOffset>)> {
    let mut parts = line.split_whitespace();
    let show_id = parts.next()?;
    let timestamp = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some((show_id.to_string(), parse_timestamp(timestamp)?))
}

/// Parse an RFC 3339 timestamp; offset-less ISO timestamps are read as UTC
fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

/// Write a file through a sibling `.temp` file and a rename, so readers
/// never observe a half-written file
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut temp_name = OsString::from(path.as_os_str());
    temp_name.push(".temp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, path)
}
