use tracing::debug;

use super::listing::ListingEntry;

/// Upper bound on episodes resolved per show and run
pub const MAX_EPISODES_PER_RUN: usize = 10;

/// Keep entries matching any filter keyword, then the most recent ones
///
/// `entries` must be sorted oldest first. Filters are lower-case keywords
/// matched as substrings of the lower-cased title; `None` keeps everything.
pub fn select_episodes<'a>(
    entries: &'a [ListingEntry],
    filters: Option<&[String]>,
) -> Vec<&'a ListingEntry> {
    let matching: Vec<&ListingEntry> = entries
        .iter()
        .filter(|entry| match filters {
            None => true,
            Some(filters) => {
                let title = entry.title.to_lowercase();
                let matched = filters.iter().any(|f| title.contains(f.as_str()));
                debug!(%title, matched, "Exploring title");
                matched
            }
        })
        .collect();

    let skip = matching.len().saturating_sub(MAX_EPISODES_PER_RUN);
    matching.into_iter().skip(skip).collect()
}
