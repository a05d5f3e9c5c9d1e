mod publish;

pub use publish::{
    FeedEntry, PublishedFeed, build_channel, collect_entries, feed_path, feed_url, publish_feed,
};
