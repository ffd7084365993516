use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::models::{normalize_tags, DigestTopic, FeedGroup, Insight};

/// Keep topics that have a title, a summary and at least one reference to
/// an article that was actually offered. References are de-duplicated, as are tags.
pub fn validate_topics(topics: Vec<DigestTopic>, known_ids: &HashSet<&str>) -> Vec<DigestTopic> {
    topics
        .into_iter()
        .filter_map(|topic| {
            let title = topic.title.trim().to_string();
            let summary = topic.summary.trim().to_string();
            if title.is_empty() || summary.is_empty() {
                tracing::warn!("Dropping digest topic without title or summary");
                return None;
            }

            let mut seen = HashSet::new();
            let article_ids: Vec<String> = topic
                .article_ids
                .iter()
                .map(|id| id.trim())
                .filter(|id| known_ids.contains(id) && seen.insert(*id))
                .map(str::to_string)
                .collect();
            if article_ids.is_empty() {
                tracing::warn!("Dropping digest topic {:?}: no known article ids", title);
                return None;
            }

            Some(DigestTopic {
                title,
                summary,
                tags: normalize_tags(&topic.tags),
                article_ids,
            })
        })
        .collect()
}

pub fn validate_insight(insight: Insight) -> Result<Insight> {
    let summary = insight.summary.trim().to_string();
    if summary.is_empty() {
        return Err(AppError::NoValidOutput("insight"));
    }
    Ok(Insight {
        summary,
        tags: normalize_tags(&insight.tags),
    })
}

/// Keep named groups, restricted to subscribed URLs, without empty groups.
pub fn validate_groups(groups: Vec<FeedGroup>, known_urls: &HashSet<&str>) -> Vec<FeedGroup> {
    groups
        .into_iter()
        .filter_map(|group| {
            let name = group.name.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let mut seen = HashSet::new();
            let feed_urls: Vec<String> = group
                .feed_urls
                .iter()
                .map(|url| url.trim())
                .filter(|url| known_urls.contains(url) && seen.insert(*url))
                .map(str::to_string)
                .collect();
            (!feed_urls.is_empty()).then_some(FeedGroup { name, feed_urls })
        })
        .collect()
}
