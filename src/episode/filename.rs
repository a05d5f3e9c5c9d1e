use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Extension of published audio files
pub const AUDIO_EXTENSION: &str = "mp3";

/// Generate the filename stem (without extension) for an episode
///
/// Format: "{show_id}-{YYYYMMDD}-{episode_id}", with the date taken in UTC.
/// The stem doubles as the dedup key and the feed item guid.
pub fn episode_stem(show_id: &str, pub_date: &DateTime<FixedOffset>, episode_id: &str) -> String {
    format!(
        "{}-{}-{}",
        show_id,
        pub_date.with_timezone(&Utc).format("%Y%m%d"),
        sanitize_episode_id(episode_id)
    )
}

/// Complete audio filename for a stem
pub fn audio_filename(stem: &str) -> String {
    format!("{stem}.{AUDIO_EXTENSION}")
}

/// Make an extractor-reported id safe to embed in a filename
pub(crate) fn sanitize_episode_id(episode_id: &str) -> String {
    sanitize_filename::sanitize_with_options(
        episode_id,
        sanitize_filename::Options {
            replacement: "_",
            ..Default::default()
        },
    )
}

/// Components recovered from an audio filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAudioName {
    pub show_id: String,
    pub date: NaiveDate,
    /// Sanitized episode id, may itself contain dashes
    pub episode_id: String,
}

/// Split an audio filename back into its components
///
/// Returns `None` for anything not shaped like a published episode file.
pub fn parse_audio_filename(filename: &str) -> Option<ParsedAudioName> {
    let stem = filename.strip_suffix(&format!(".{AUDIO_EXTENSION}"))?;
    let mut parts = stem.splitn(3, '-');

    let show_id = parts.next().filter(|s| !s.is_empty())?;
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y%m%d").ok()?;
    let episode_id = parts.next().filter(|s| !s.is_empty())?;

    Some(ParsedAudioName {
        show_id: show_id.to_string(),
        date,
        episode_id: episode_id.to_string(),
    })
}
