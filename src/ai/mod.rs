//! Text-generation capabilities the engine consumes.
//!
//! Each capability is optional: the app holds `Option<Arc<dyn ...>>` and
//! decides once, at the boundary, whether a feature is available. Whatever a
//! backend returns is parsed leniently and validated before use.

mod claude;
mod parse;
mod validate;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DigestTopic, FeedDescriptor, FeedGroup, HistoryItem, Insight, InsightRequest};

pub use claude::ClaudeClient;
pub use parse::{extract_json, parse_groups, parse_insight, parse_topics};
pub use validate::{validate_groups, validate_insight, validate_topics};

/// Summarizes and tags a single article.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate_insight(&self, request: &InsightRequest) -> Result<Insight>;
}

/// Proposes the topics of a daily digest from that day's articles.
#[async_trait]
pub trait TopicGenerator: Send + Sync {
    async fn generate_topics(
        &self,
        date_key: &str,
        articles: &[HistoryItem],
    ) -> Result<Vec<DigestTopic>>;
}

/// Sorts subscriptions into named groups.
#[async_trait]
pub trait FeedGroupGenerator: Send + Sync {
    async fn generate_groups(&self, feeds: &[FeedDescriptor]) -> Result<Vec<FeedGroup>>;
}
