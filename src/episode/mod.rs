mod download;
mod filename;

pub use download::{DownloadContext, DownloadResult, download_episode};
pub use filename::{AUDIO_EXTENSION, ParsedAudioName, audio_filename, episode_stem, parse_audio_filename};
pub(crate) use filename::sanitize_episode_id;
