mod fetch;
mod model;
mod parse;
mod sniff;

pub use fetch::{FeedDownload, fetch_feed, read_feed_file};
pub use model::{Episode, Podcast};
pub use parse::{parse_feed, parse_publication_date};
pub use sniff::{
    content_type_is_xml, guess_content_type_from_name, is_feed_candidate, is_xml, looks_like_xml,
};
