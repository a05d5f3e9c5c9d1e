// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recurrence evaluation: decides whether a show is due for processing.
//!
//! Classic five-field cron expressions (minute first, day-of-week 0-7 with
//! Sunday as 0 or 7) are accepted as well as the seconds-first six or seven
//! field form understood by the `cron` crate.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;

use crate::error::ScheduleError;

/// Outcome of a due check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueStatus {
    /// The operator selected this show explicitly
    Forced,
    /// The show has never been processed
    FirstRun,
    /// The next occurrence after the last run has already passed
    Due { next: DateTime<Utc> },
    /// The next occurrence is still in the future
    NotYet { next: DateTime<Utc> },
    /// The expression has no occurrence after the last run
    Never,
}

impl DueStatus {
    pub fn is_due(&self) -> bool {
        matches!(self, Self::Forced | Self::FirstRun | Self::Due { .. })
    }
}

/// Parse a cron expression into a schedule
pub fn parse_schedule(expression: &str) -> Result<Schedule, ScheduleError> {
    let normalized = normalize_expression(expression)?;
    Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Decide whether a show is due at `now`
///
/// Pure function of its inputs: no clock is read here.
pub fn check_due(
    expression: &str,
    last_run: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
    forced: bool,
) -> Result<DueStatus, ScheduleError> {
    if forced {
        return Ok(DueStatus::Forced);
    }
    let Some(last_run) = last_run else {
        return Ok(DueStatus::FirstRun);
    };

    let schedule = parse_schedule(expression)?;
    let last_run = last_run.with_timezone(&Utc);

    Ok(match schedule.after(&last_run).next() {
        Some(next) if next <= now => DueStatus::Due { next },
        Some(next) => DueStatus::NotYet { next },
        None => DueStatus::Never,
    })
}

fn normalize_expression(expression: &str) -> Result<String, ScheduleError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            translate_day_of_week(fields[4])
        )),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5, 6 or 7 fields, found {n}"),
        }),
    }
}

/// Map classic day-of-week numbers (0/7 = Sunday) to the 1-7 range
/// (1 = Sunday) used by the `cron` crate. Names pass through unchanged.
fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(translate_day_of_week_part)
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_day_of_week_part(part: &str) -> String {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };

    // stepped numeric ranges are expanded so a range ending on Sunday
    // never turns into a reversed one
    if let Some(days) = expand_stepped_range(range, step) {
        let mut translated: Vec<String> = Vec::new();
        for day in days {
            let day = translate_day(&day.to_string());
            if !translated.contains(&day) {
                translated.push(day);
            }
        }
        return translated.join(",");
    }

    let translated = match range.split_once('-') {
        Some((start, end)) => match (start.parse::<u32>(), end.parse::<u32>()) {
            // a range ending on Sunday wraps past Saturday
            (Ok(0), Ok(7)) => "1-7".to_string(),
            (Ok(start), Ok(7)) if step.is_none() => format!("{}-7,1", start + 1),
            _ => format!("{}-{}", translate_day(start), translate_day(end)),
        },
        None => translate_day(range),
    };

    match step {
        Some(step) => format!("{translated}/{step}"),
        None => translated,
    }
}

fn expand_stepped_range(range: &str, step: Option<&str>) -> Option<Vec<u32>> {
    let step = step?.parse::<usize>().ok().filter(|step| *step > 0)?;
    let (start, end) = range.split_once('-')?;
    let (start, end) = (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?);
    if start > end || end > 7 {
        return None;
    }
    Some((start..=end).step_by(step).collect())
}

fn translate_day(day: &str) -> String {
    match day.parse::<u32>() {
        Ok(0) | Ok(7) => "1".to_string(),
        Ok(n) => (n + 1).to_string(),
        Err(_) => day.to_string(),
    }
}
