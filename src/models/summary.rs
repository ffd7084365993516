//! Shapes exchanged with the AI generators.
//!
//! Generator output is untrusted: every field defaults to empty so a partial
//! answer still deserializes, and callers validate before using it.

use serde::{Deserialize, Serialize};

use super::HistoryItem;

/// Input for a single-article insight.
#[derive(Debug, Clone, Serialize)]
pub struct InsightRequest {
    pub id: String,
    pub title: String,
    pub feed_title: String,
    pub link: String,
    pub body: String,
}

impl InsightRequest {
    pub fn from_item(item: &HistoryItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            feed_title: item.origin_feed_title.clone(),
            link: item.link.clone(),
            body: if item.body.is_empty() {
                item.description.clone()
            } else {
                item.body.clone()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Insight {
    pub summary: String,
    pub tags: Vec<String>,
}

/// One topic of a daily digest as proposed by the topic generator.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DigestTopic {
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    #[serde(alias = "articleIds", alias = "ids")]
    pub article_ids: Vec<String>,
}

/// A subscription as shown to the feed grouping generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedDescriptor {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedGroup {
    pub name: String,
    #[serde(alias = "feeds", alias = "urls")]
    pub feed_urls: Vec<String>,
}

/// Result of building today's digest.
#[derive(Debug, Clone)]
pub struct DailyDigest {
    pub date_key: String,
    pub items: Vec<HistoryItem>,
    pub used_cache: bool,
}
