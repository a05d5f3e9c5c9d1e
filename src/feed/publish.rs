// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use rss::extension::itunes::ITunesChannelExtensionBuilder;
use rss::{Channel, ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item, ItemBuilder};
use tracing::{debug, info};

use crate::config::{MainConfig, ShowConfig};
use crate::episode::{AUDIO_EXTENSION, parse_audio_filename, sanitize_episode_id};
use crate::error::FeedError;
use crate::history::write_atomic;
use crate::metadata::{metadata_path_for, read_episode_metadata};
use crate::playlist::EpisodeRecord;
use crate::state::scan_output_dir;

const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// One published episode, joined from a file on disk and its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Audio filename without extension, used as the item guid
    pub guid: String,
    pub title: String,
    pub description: String,
    pub pub_date: DateTime<FixedOffset>,
    pub link: Option<String>,
    pub enclosure_url: String,
    pub length: u64,
}

/// Result of a publish
#[derive(Debug, Clone)]
pub struct PublishedFeed {
    pub path: PathBuf,
    pub entries: usize,
}

/// Public URL of a show's feed
pub fn feed_url(main: &MainConfig, show_id: &str) -> String {
    format!("{}{}.xml", main.base_public_url, show_id)
}

/// Local path of a show's feed
pub fn feed_path(main: &MainConfig, show_id: &str) -> PathBuf {
    main.podcast_dir.join(format!("{show_id}.xml"))
}

/// Regenerate a show's feed from every audio file on disk
///
/// Metadata comes from `records` when the file's episode id is among them,
/// otherwise from the sidecar manifest next to the file. Files with neither
/// are left out. The feed file is replaced atomically.
pub fn publish_feed(
    show: &ShowConfig,
    main: &MainConfig,
    records: &[EpisodeRecord],
    now: DateTime<Utc>,
) -> Result<PublishedFeed, FeedError> {
    let entries = collect_entries(&show.id, main, records)?;
    info!(show = %show.id, count = entries.len(), "Generating feed");

    let channel = build_channel(show, main, &entries, now);
    let xml = channel.pretty_write_to(Vec::new(), b' ', 2)?;

    let path = feed_path(main, &show.id);
    write_atomic(&path, &xml).map_err(|e| FeedError::WriteFailed {
        path: path.clone(),
        source: e,
    })?;

    Ok(PublishedFeed {
        path,
        entries: entries.len(),
    })
}

/// Join the show's audio files with what is known about them, newest first
pub fn collect_entries(
    show_id: &str,
    main: &MainConfig,
    records: &[EpisodeRecord],
) -> Result<Vec<FeedEntry>, FeedError> {
    let state = scan_output_dir(&main.podcast_dir)?;
    let by_id: HashMap<String, &EpisodeRecord> = records
        .iter()
        .map(|record| (sanitize_episode_id(&record.episode_id), record))
        .collect();

    let mut entries = Vec::new();
    for filename in state.show_audio_files(show_id) {
        let Some(parsed) = parse_audio_filename(filename) else {
            debug!(%filename, "Ignoring audio file with unexpected name");
            continue;
        };
        let path = main.podcast_dir.join(filename);

        let Some(details) = lookup_details(&path, by_id.get(&parsed.episode_id).copied()) else {
            debug!(episode = %parsed.episode_id, "Ignoring mp3 on disk without metadata");
            continue;
        };

        let length = std::fs::metadata(&path)
            .map_err(|e| FeedError::StatFailed {
                path: path.clone(),
                source: e,
            })?
            .len();

        entries.push(FeedEntry {
            guid: filename
                .strip_suffix(&format!(".{AUDIO_EXTENSION}"))
                .unwrap_or(filename)
                .to_string(),
            title: details.title,
            description: details.description,
            pub_date: details.pub_date,
            link: details.link,
            enclosure_url: format!("{}{}", main.base_public_url, filename),
            length,
        });
    }

    entries.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then_with(|| a.guid.cmp(&b.guid)));
    Ok(entries)
}

struct EntryDetails {
    title: String,
    description: String,
    pub_date: DateTime<FixedOffset>,
    link: Option<String>,
}

fn lookup_details(audio_path: &Path, record: Option<&EpisodeRecord>) -> Option<EntryDetails> {
    if let Some(record) = record {
        return Some(EntryDetails {
            title: record.title.clone(),
            description: record.description.clone(),
            pub_date: record.pub_date,
            link: Some(record.webpage_url.clone()),
        });
    }

    let sidecar = metadata_path_for(audio_path);
    match read_episode_metadata(&sidecar) {
        Ok(metadata) => Some(EntryDetails {
            title: metadata.title,
            description: metadata.description,
            pub_date: metadata.pub_date,
            link: Some(metadata.webpage_url),
        }),
        Err(e) => {
            debug!(path = %sidecar.display(), error = %e, "No usable episode manifest");
            None
        }
    }
}

/// Build the RSS document for a show
pub fn build_channel(
    show: &ShowConfig,
    main: &MainConfig,
    entries: &[FeedEntry],
    now: DateTime<Utc>,
) -> Channel {
    let link = feed_url(main, &show.id);
    let items: Vec<Item> = entries.iter().map(build_item).collect();

    let mut itunes = ITunesChannelExtensionBuilder::default();
    itunes.summary(Some(show.description.clone()));

    let mut builder = ChannelBuilder::default();
    builder
        .title(show.title.clone())
        .link(link.clone())
        .description(show.description.clone())
        .last_build_date(Some(now.to_rfc2822()))
        .items(items);

    if let Some(image_url) = &show.image_url {
        itunes.image(Some(image_url.clone()));
        builder.image(Some(
            ImageBuilder::default()
                .url(image_url.clone())
                .title(show.title.clone())
                .link(link)
                .build(),
        ));
    }

    builder.itunes_ext(Some(itunes.build())).build()
}

fn build_item(entry: &FeedEntry) -> Item {
    ItemBuilder::default()
        .title(Some(entry.title.clone()))
        .description(Some(entry.description.clone()))
        .link(entry.link.clone())
        .pub_date(Some(entry.pub_date.to_rfc2822()))
        .guid(Some(
            GuidBuilder::default()
                .value(entry.guid.clone())
                .permalink(false)
                .build(),
        ))
        .enclosure(Some(
            EnclosureBuilder::default()
                .url(entry.enclosure_url.clone())
                .length(entry.length.to_string())
                .mime_type(AUDIO_MIME_TYPE.to_string())
                .build(),
        ))
        .build()
}
