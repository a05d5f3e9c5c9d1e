mod episode;

pub use episode::{EpisodeMetadata, metadata_path_for, read_episode_metadata, write_episode_metadata};
