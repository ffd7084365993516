pub mod coordinator;
pub mod opml;
pub mod source;

pub use coordinator::{FetchBatch, FetchCoordinator};
pub use self::opml::parse_opml_file;
pub use source::{FeedSource, HttpFeedSource};
