// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::warn;
use url::Url;

use crate::error::ConfigError;
use crate::schedule::parse_schedule;

const MAIN_KEYS: [&str; 3] = ["base-public-url", "podcast-dir", "history-file"];
const SHOW_KEYS: [&str; 5] = ["title", "description", "url", "cron", "start-timestamp"];

const DEFAULT_EXTRACTOR: &str = "yt-dlp";
const DEFAULT_TRANSCODER: &str = "ffmpeg";

/// Global settings shared by every show
#[derive(Debug, Clone)]
pub struct MainConfig {
    /// Prefix for public file and feed URLs, always ending in '/'
    pub base_public_url: String,
    pub podcast_dir: PathBuf,
    pub history_file: PathBuf,
    /// Extraction executable (yt-dlp compatible)
    pub extractor: String,
    /// Transcoding executable (ffmpeg compatible)
    pub transcoder: String,
    /// Values passed as `--extractor-args` when listing playlists
    pub extractor_args: Vec<String>,
}

/// Settings for one configured show
#[derive(Debug, Clone)]
pub struct ShowConfig {
    pub id: String,
    pub title: String,
    pub description: String,
    pub urls: Vec<String>,
    pub cron: String,
    /// Episodes published before this instant are never downloaded
    pub start_timestamp: DateTime<Utc>,
    /// Lower-cased keywords; `None` keeps every episode
    pub filters: Option<Vec<String>>,
    pub image_url: Option<String>,
}

/// Validated configuration: main settings plus shows in file order
#[derive(Debug, Clone)]
pub struct Config {
    pub main: MainConfig,
    pub shows: Vec<ShowConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMain {
    base_public_url: String,
    podcast_dir: PathBuf,
    history_file: PathBuf,
    #[serde(default)]
    extractor: Option<String>,
    #[serde(default)]
    transcoder: Option<String>,
    #[serde(default)]
    extractor_args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawShow {
    title: String,
    description: String,
    url: OneOrMany,
    cron: String,
    start_timestamp: Value,
    #[serde(default)]
    filters: Option<Vec<String>>,
    #[serde(default)]
    image_url: Option<String>,
}

/// Load and validate the configuration file
///
/// When `selected_show` is given, every other show is skipped (with a
/// warning) and the selected one must exist.
pub fn load_config(path: &Path, selected_show: Option<&str>) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_config(&content, selected_show)
}

/// Validate configuration from YAML text
pub fn parse_config(yaml: &str, selected_show: Option<&str>) -> Result<Config, ConfigError> {
    let raw: Value = serde_yaml::from_str(yaml)?;
    let root = raw.as_mapping().ok_or(ConfigError::NotAMapping)?;

    let main = parse_main(root.get("main"))?;

    let shows_section = root
        .get("shows")
        .and_then(Value::as_mapping)
        .ok_or(ConfigError::MissingShows)?;

    let mut seen = HashSet::new();
    let mut shows = Vec::new();
    for (key, data) in shows_section {
        let show_id = show_id_from_key(key)?;
        if !seen.insert(show_id.clone()) {
            return Err(ConfigError::DuplicateShowId(show_id));
        }

        if let Some(selected) = selected_show
            && selected != show_id
        {
            warn!(show = %show_id, "Ignoring config because not selected show");
            continue;
        }

        shows.push(parse_show(show_id, data)?);
    }

    if let Some(selected) = selected_show
        && shows.is_empty()
    {
        return Err(ConfigError::UnknownShow(selected.to_string()));
    }

    Ok(Config { main, shows })
}

fn parse_main(section: Option<&Value>) -> Result<MainConfig, ConfigError> {
    let empty = Mapping::new();
    let mapping = section.and_then(Value::as_mapping).unwrap_or(&empty);

    let missing = missing_keys(mapping, &MAIN_KEYS);
    if !missing.is_empty() {
        return Err(ConfigError::MissingMainKeys(missing));
    }

    let raw: RawMain = serde_yaml::from_value(Value::Mapping(mapping.clone()))?;

    Url::parse(&raw.base_public_url).map_err(|e| invalid("main", "base-public-url", e))?;
    let mut base_public_url = raw.base_public_url;
    if !base_public_url.ends_with('/') {
        base_public_url.push('/');
    }

    Ok(MainConfig {
        base_public_url,
        podcast_dir: raw.podcast_dir,
        history_file: raw.history_file,
        extractor: raw.extractor.unwrap_or_else(|| DEFAULT_EXTRACTOR.to_string()),
        transcoder: raw
            .transcoder
            .unwrap_or_else(|| DEFAULT_TRANSCODER.to_string()),
        extractor_args: raw.extractor_args,
    })
}

fn parse_show(id: String, data: &Value) -> Result<ShowConfig, ConfigError> {
    let empty = Mapping::new();
    let mapping = data.as_mapping().unwrap_or(&empty);

    let missing = missing_keys(mapping, &SHOW_KEYS);
    if !missing.is_empty() {
        return Err(ConfigError::MissingShowKeys {
            show_id: id,
            keys: missing,
        });
    }

    let raw: RawShow = serde_yaml::from_value(data.clone())?;
    let section = format!("show {id}");

    let urls = match raw.url {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    };
    if urls.is_empty() {
        return Err(invalid(&section, "url", "at least one playlist URL is required"));
    }
    for url in &urls {
        Url::parse(url).map_err(|e| invalid(&section, "url", e))?;
    }

    if let Some(image_url) = &raw.image_url {
        Url::parse(image_url).map_err(|e| invalid(&section, "image-url", e))?;
    }

    parse_schedule(&raw.cron).map_err(|e| invalid(&section, "cron", e))?;

    let start_timestamp = parse_start_timestamp(&raw.start_timestamp)
        .ok_or_else(|| invalid(&section, "start-timestamp", "expected a date like 2024-06-01"))?;

    let filters = raw
        .filters
        .map(|filters| filters.into_iter().map(|f| f.to_lowercase()).collect());

    Ok(ShowConfig {
        id,
        title: raw.title,
        description: raw.description,
        urls,
        cron: raw.cron,
        start_timestamp,
        filters,
        image_url: raw.image_url,
    })
}

fn show_id_from_key(key: &Value) -> Result<String, ConfigError> {
    let id = match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(ConfigError::InvalidShowId(format!("{other:?}"))),
    };

    if id.is_empty() || !id.chars().all(char::is_alphanumeric) {
        return Err(ConfigError::InvalidShowId(id));
    }
    Ok(id)
}

fn missing_keys(mapping: &Mapping, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|key| !mapping.contains_key(**key))
        .map(|key| key.to_string())
        .collect()
}

/// Normalize a start timestamp to midnight UTC of its calendar day
fn parse_start_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let date = NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(&text).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })?;

    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn invalid(section: &str, field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidField {
        section: section.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    const SAMPLE_CONFIG: &str = r#"
main:
  base-public-url: https://example.com/podcasts
  podcast-dir: /srv/podcasts
  history-file: /var/lib/yt2pod/history
shows:
  news:
    title: Daily News
    description: The news, as audio
    url: https://www.youtube.com/playlist?list=PL1
    cron: "0 10 * * *"
    start-timestamp: 2024-06-01
    filters: [News, "Roundup"]
  talk2:
    title: Talk Show
    description: People talking
    url:
      - https://www.youtube.com/playlist?list=PL2
      - https://www.youtube.com/playlist?list=PL3
    cron: "0 0 12 * * MON"
    start-timestamp: 2024-01-15T18:30:00+02:00
    image-url: https://example.com/talk.png
"#;

    #[test]
    fn parses_main_and_shows_in_order() {
        let config = parse_config(SAMPLE_CONFIG, None).unwrap();

        assert_eq!(config.main.base_public_url, "https://example.com/podcasts/");
        assert_eq!(config.main.podcast_dir, PathBuf::from("/srv/podcasts"));
        assert_eq!(config.main.extractor, "yt-dlp");
        assert_eq!(config.main.transcoder, "ffmpeg");

        let ids: Vec<_> = config.shows.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["news", "talk2"]);
    }

    #[test]
    fn accepts_single_or_multiple_urls() {
        let config = parse_config(SAMPLE_CONFIG, None).unwrap();

        assert_eq!(config.shows[0].urls.len(), 1);
        assert_eq!(config.shows[1].urls.len(), 2);
    }

    #[test]
    fn lowercases_filters() {
        let config = parse_config(SAMPLE_CONFIG, None).unwrap();

        assert_eq!(
            config.shows[0].filters,
            Some(vec!["news".to_string(), "roundup".to_string()])
        );
        assert!(config.shows[1].filters.is_none());
    }

    #[test]
    fn start_timestamp_is_truncated_to_utc_midnight() {
        let config = parse_config(SAMPLE_CONFIG, None).unwrap();

        assert_eq!(
            config.shows[0].start_timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            config.shows[1].start_timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_non_mapping_root() {
        let result = parse_config("- just\n- a list\n", None);
        assert!(matches!(result, Err(ConfigError::NotAMapping)));
    }

    #[test]
    fn rejects_main_without_history_file() {
        let yaml = r#"
main:
  base-public-url: https://example.com/
  podcast-dir: /srv/podcasts
shows: {}
"#;
        match parse_config(yaml, None) {
            Err(ConfigError::MissingMainKeys(keys)) => {
                assert_eq!(keys, vec!["history-file".to_string()])
            }
            other => panic!("Expected MissingMainKeys, got {other:?}"),
        }
    }

    #[test]
    fn rejects_show_id_with_hyphen() {
        let yaml = SAMPLE_CONFIG.replace("  talk2:", "  talk-2:");
        match parse_config(&yaml, None) {
            Err(ConfigError::InvalidShowId(id)) => assert_eq!(id, "talk-2"),
            other => panic!("Expected InvalidShowId, got {other:?}"),
        }
    }

    #[test]
    fn rejects_show_missing_required_keys() {
        let yaml = r#"
main:
  base-public-url: https://example.com/
  podcast-dir: /srv/podcasts
  history-file: /tmp/history
shows:
  bare:
    title: Bare
    url: https://www.youtube.com/playlist?list=PL1
"#;
        match parse_config(yaml, None) {
            Err(ConfigError::MissingShowKeys { show_id, keys }) => {
                assert_eq!(show_id, "bare");
                assert_eq!(keys, vec!["description", "cron", "start-timestamp"]);
            }
            other => panic!("Expected MissingShowKeys, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_cron() {
        let yaml = SAMPLE_CONFIG.replace("\"0 10 * * *\"", "\"every day\"");
        let result = parse_config(&yaml, None);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField { ref field, .. }) if field == "cron"
        ));
    }

    #[test]
    fn selected_show_skips_the_others() {
        let config = parse_config(SAMPLE_CONFIG, Some("talk2")).unwrap();

        assert_eq!(config.shows.len(), 1);
        assert_eq!(config.shows[0].id, "talk2");
    }

    #[test]
    fn unknown_selected_show_is_an_error() {
        let result = parse_config(SAMPLE_CONFIG, Some("missing"));
        assert!(matches!(result, Err(ConfigError::UnknownShow(id)) if id == "missing"));
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE_CONFIG).unwrap();

        let config = load_config(&path, None).unwrap();
        assert_eq!(config.shows.len(), 2);
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_config(&dir.path().join("nope.yaml"), None);
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }
}
