mod listing;
mod resolve;
mod select;

pub use listing::{
    DateApproximator, ListingEntry, ListingOptions, approximate_age, fetch_playlists,
    parse_listing, sort_by_date,
};
pub use resolve::{
    EpisodeRecord, PREFERRED_FORMATS, parse_metadata, pick_best_format, resolve_episodes,
};
pub use select::{MAX_EPISODES_PER_RUN, select_episodes};
