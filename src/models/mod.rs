mod fetch;
mod item;
mod summary;

pub use fetch::{FetchOptions, FetchReport};
pub use item::{normalize_tags, HistoryItem, ItemKind, SourceItem};
pub use summary::{DailyDigest, DigestTopic, FeedDescriptor, FeedGroup, Insight, InsightRequest};

/// Which slice of history a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArticleFilter {
    #[default]
    Unread,
    Bookmarked,
    All,
}

impl ArticleFilter {
    pub fn matches(&self, item: &HistoryItem) -> bool {
        match self {
            ArticleFilter::All => true,
            ArticleFilter::Unread => !item.is_read,
            ArticleFilter::Bookmarked => item.is_bookmarked,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unread" => Some(ArticleFilter::Unread),
            "bookmarked" | "starred" => Some(ArticleFilter::Bookmarked),
            "all" => Some(ArticleFilter::All),
            _ => None,
        }
    }
}
