// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::listing::parse_compact_date;
use crate::error::ExtractError;
use crate::tools::Extractor;

/// Known audio-carrying format ids, most preferred first: m4a 128k and
/// 48k, opus 160k/70k/50k, then the 360p mp4 that always has audio
pub const PREFERRED_FORMATS: &[&str] = &["140", "139", "251", "250", "249", "18"];

/// Fully resolved metadata of one episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub description: String,
    /// Show-unique identifier reported by the extractor
    pub episode_id: String,
    pub webpage_url: String,
    pub title: String,
    /// Publish time, always at an explicit UTC offset
    pub pub_date: DateTime<FixedOffset>,
    /// One of [`PREFERRED_FORMATS`]
    pub best_format: String,
}

#[derive(Debug, Deserialize)]
struct FullRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    fulltitle: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    formats: Vec<Format>,
}

#[derive(Debug, Deserialize)]
struct Format {
    format_id: String,
}

/// Fetch full metadata for a batch of episode URLs, most recent first
///
/// An episode without any preferred format fails the whole batch.
pub async fn resolve_episodes<E: Extractor + ?Sized>(
    extractor: &E,
    urls: &[String],
) -> Result<Vec<EpisodeRecord>, ExtractError> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    info!(count = urls.len(), "Getting episode metadata");
    let output = extractor.dump_metadata(urls).await?;
    parse_metadata(&output)
}

/// Parse dump output, one JSON document per line
pub fn parse_metadata(output: &str) -> Result<Vec<EpisodeRecord>, ExtractError> {
    let mut records = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let value: Value = serde_json::from_str(line).map_err(|e| ExtractError::InvalidJson {
            line: truncate_line(line),
            source: e,
        })?;
        if is_falsy(&value) {
            debug!("Skipping empty metadata document");
            continue;
        }

        let record: FullRecord =
            serde_json::from_value(value).map_err(|e| ExtractError::InvalidJson {
                line: truncate_line(line),
                source: e,
            })?;
        records.push(episode_from_record(record)?);
    }

    records.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
    Ok(records)
}

/// First preferred format the extractor offers
pub fn pick_best_format<S: AsRef<str>>(available: &[S]) -> Option<&'static str> {
    PREFERRED_FORMATS
        .iter()
        .copied()
        .find(|preferred| available.iter().any(|f| f.as_ref() == *preferred))
}

fn episode_from_record(record: FullRecord) -> Result<EpisodeRecord, ExtractError> {
    let episode_id = record
        .display_id
        .or(record.id)
        .ok_or_else(|| ExtractError::MissingField {
            episode_id: "<unknown>".to_string(),
            field: "id".to_string(),
        })?;

    let missing = |field: &str| ExtractError::MissingField {
        episode_id: episode_id.clone(),
        field: field.to_string(),
    };

    let webpage_url = record.webpage_url.ok_or_else(|| missing("webpage_url"))?;
    let title = record
        .fulltitle
        .or(record.title)
        .ok_or_else(|| missing("title"))?;

    let pub_date = record
        .upload_date
        .as_deref()
        .and_then(parse_compact_date)
        .or_else(|| record.release_date.as_deref().and_then(parse_compact_date))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .or_else(|| record.timestamp.and_then(|ts| DateTime::from_timestamp(ts as i64, 0)))
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| missing("upload_date"))?;

    let available: Vec<&str> = record.formats.iter().map(|f| f.format_id.as_str()).collect();
    let best_format = pick_best_format(&available).ok_or_else(|| ExtractError::NoAudioFormat {
        episode_id: episode_id.clone(),
        available: available.iter().map(|f| f.to_string()).collect(),
    })?;

    Ok(EpisodeRecord {
        description: record.description.unwrap_or_default(),
        episode_id,
        webpage_url,
        title,
        pub_date,
        best_format: best_format.to_string(),
    })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn truncate_line(line: &str) -> String {
    const MAX: usize = 120;
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record_line(id: &str, date: &str, formats: &[&str]) -> String {
        let formats: Vec<_> = formats
            .iter()
            .map(|f| serde_json::json!({ "format_id": f, "ext": "m4a" }))
            .collect();
        serde_json::json!({
            "id": id,
            "display_id": id,
            "title": format!("Title {id}"),
            "fulltitle": format!("Full {id}"),
            "description": format!("About {id}"),
            "webpage_url": format!("https://www.youtube.com/watch?v={id}"),
            "upload_date": date,
            "formats": formats,
        })
        .to_string()
    }

    #[test]
    fn picks_first_preferred_format() {
        assert_eq!(pick_best_format(&["18", "251", "140"]), Some("140"));
        assert_eq!(pick_best_format(&["18", "251"]), Some("251"));
        assert_eq!(pick_best_format(&["137", "248"]), None);
    }

    #[test]
    fn parses_records_newest_first() {
        let output = [
            record_line("old", "20240101", &["140"]),
            record_line("new", "20240301", &["251", "18"]),
        ]
        .join("\n");

        let records = parse_metadata(&output).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].episode_id, "new");
        assert_eq!(records[0].best_format, "251");
        assert_eq!(records[0].title, "Full new");
        assert_eq!(records[0].description, "About new");
        assert_eq!(
            records[0].pub_date,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().fixed_offset()
        );
        assert_eq!(records[1].episode_id, "old");
    }

    #[test]
    fn pub_date_carries_utc_offset() {
        let records = parse_metadata(&record_line("a", "20240101", &["140"])).unwrap();
        assert_eq!(records[0].pub_date.offset().local_minus_utc(), 0);
    }

    #[test]
    fn skips_blank_and_falsy_documents() {
        let output = format!("\nnull\n{{}}\n{}\n", record_line("a", "20240101", &["140"]));
        let records = parse_metadata(&output).unwrap();

        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_format_fails_the_whole_batch() {
        let output = [
            record_line("good", "20240101", &["140"]),
            record_line("bad", "20240102", &["137"]),
        ]
        .join("\n");

        match parse_metadata(&output) {
            Err(ExtractError::NoAudioFormat {
                episode_id,
                available,
            }) => {
                assert_eq!(episode_id, "bad");
                assert_eq!(available, vec!["137"]);
            }
            other => panic!("Expected NoAudioFormat, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_an_error() {
        let result = parse_metadata("not json at all");
        assert!(matches!(result, Err(ExtractError::InvalidJson { .. })));
    }

    #[test]
    fn missing_date_is_an_error() {
        let line = serde_json::json!({
            "id": "x",
            "title": "No date",
            "webpage_url": "https://y.com/x",
            "formats": [{ "format_id": "140" }],
        })
        .to_string();

        assert!(matches!(
            parse_metadata(&line),
            Err(ExtractError::MissingField { ref field, .. }) if field == "upload_date"
        ));
    }

    #[test]
    fn falls_back_to_id_and_title() {
        let line = serde_json::json!({
            "id": "plain",
            "title": "Plain title",
            "webpage_url": "https://y.com/plain",
            "timestamp": 1709287200,
            "formats": [{ "format_id": "140" }],
        })
        .to_string();

        let records = parse_metadata(&line).unwrap();
        assert_eq!(records[0].episode_id, "plain");
        assert_eq!(records[0].title, "Plain title");
        assert_eq!(records[0].description, "");
        assert_eq!(
            records[0].pub_date,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap().fixed_offset()
        );
    }

    #[test]
    fn long_lines_are_truncated_in_errors() {
        let long = "x".repeat(500);
        assert_eq!(truncate_line(&long).len(), 123);
    }
}
