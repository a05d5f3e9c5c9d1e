// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::tools::Extractor;

/// Turns a relative publish text ("hace 3 días") into an age
pub type DateApproximator = fn(&str) -> Option<TimeDelta>;

/// One entry of a flat playlist listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub title: String,
    pub url: String,
    /// Publish day; `None` when the extractor gave nothing usable
    pub date: Option<NaiveDate>,
}

/// Inputs to the listing step besides the playlist URLs
#[derive(Debug, Clone, Copy)]
pub struct ListingOptions<'a> {
    /// Values passed as `--extractor-args`
    pub extractor_args: &'a [String],
    /// Fallback for entries that only carry a relative publish text
    pub approximate: DateApproximator,
    /// Reference time for relative dates
    pub now: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FlatRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    release_timestamp: Option<f64>,
    #[serde(default)]
    published_time_text: Option<String>,
}

/// List every playlist and merge the results, oldest first
///
/// Extractor failures are logged and treated as an empty listing.
pub async fn fetch_playlists<E: Extractor + ?Sized>(
    extractor: &E,
    urls: &[String],
    options: &ListingOptions<'_>,
) -> Vec<ListingEntry> {
    let mut entries = Vec::new();

    for url in urls {
        info!(%url, "Getting playlist metadata");
        match extractor.flat_listing(url, options.extractor_args).await {
            Ok(output) => entries.extend(parse_listing(&output, options)),
            Err(e) => warn!(%url, error = %e, "Failed to list playlist"),
        }
    }

    sort_by_date(&mut entries);
    entries
}

/// Parse flat listing output, one JSON object per line
pub fn parse_listing(output: &str, options: &ListingOptions<'_>) -> Vec<ListingEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<FlatRecord>(line) {
            Ok(record) => entry_from_record(record, options),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable listing line");
                None
            }
        })
        .collect()
}

/// Stable sort by day; undated entries sort first
pub fn sort_by_date(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| a.date.cmp(&b.date));
}

fn entry_from_record(record: FlatRecord, options: &ListingOptions<'_>) -> Option<ListingEntry> {
    let title = record.title.clone().unwrap_or_default();

    let Some(url) = record.url.clone().or_else(|| record.webpage_url.clone()) else {
        warn!(id = ?record.id, %title, "Ignoring listing entry without URL");
        return None;
    };

    let date = resolve_listing_date(&record, options);
    if date.is_none() {
        warn!(id = ?record.id, %title, "Listing entry has no usable date");
    } else {
        debug!(%title, ?date, "Exploring episode");
    }

    Some(ListingEntry { title, url, date })
}

fn resolve_listing_date(record: &FlatRecord, options: &ListingOptions<'_>) -> Option<NaiveDate> {
    record
        .upload_date
        .as_deref()
        .and_then(parse_compact_date)
        .or_else(|| record.release_date.as_deref().and_then(parse_compact_date))
        .or_else(|| {
            record
                .timestamp
                .or(record.release_timestamp)
                .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
                .map(|dt| dt.date_naive())
        })
        .or_else(|| {
            let age = (options.approximate)(record.published_time_text.as_deref()?)?;
            Some(options.now.checked_sub_signed(age)?.date_naive())
        })
}

/// Parse the extractor's `YYYYMMDD` dates
pub(crate) fn parse_compact_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y%m%d").ok()
}

/// Approximate the age described by a relative publish text.
///
/// Understands Spanish ("hace 4 meses", "1000 vistas • hace 3 días",
/// "Transmitido hace 5 meses") and English ("3 days ago"). Months count
/// as 30 days and years as 365.
pub fn approximate_age(text: &str) -> Option<TimeDelta> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let (quantity, unit) = if let Some(pos) = words.iter().position(|w| *w == "hace") {
        (*words.get(pos + 1)?, *words.get(pos + 2)?)
    } else if let Some(pos) = words.iter().position(|w| *w == "ago") {
        (*words.get(pos.checked_sub(2)?)?, *words.get(pos - 1)?)
    } else {
        return None;
    };

    let quantity: i64 = quantity.parse().ok()?;
    let unit = unit.trim_matches(|c: char| !c.is_alphabetic());
    TimeDelta::try_seconds(quantity.checked_mul(unit_seconds(unit)?)?)
}

fn unit_seconds(unit: &str) -> Option<i64> {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    Some(match unit {
        "segundo" | "segundos" | "second" | "seconds" => 1,
        "minuto" | "minutos" | "minute" | "minutes" => MINUTE,
        "hora" | "horas" | "hour" | "hours" => HOUR,
        "día" | "días" | "dia" | "dias" | "day" | "days" => DAY,
        "semana" | "semanas" | "week" | "weeks" => 7 * DAY,
        "mes" | "meses" | "month" | "months" => 30 * DAY,
        "año" | "años" | "year" | "years" => 365 * DAY,
        _ => return None,
    })
}
