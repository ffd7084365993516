use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An item as handed back by a feed source, before it has an identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceItem {
    pub guid: String,
    pub link: String,
    pub title: String,
    pub published_text: String,
    pub published_date: Option<DateTime<Utc>>,
    pub description: String,
    pub body: String,
    pub origin_feed_url: String,
    pub origin_feed_title: String,
    /// When the fetch that produced this item completed. Stamped by the
    /// coordinator and used to order items without a published date.
    pub seen_at: Option<DateTime<Utc>>,
}

impl SourceItem {
    /// Canonical identity: first non-empty of guid, link, title.
    pub fn identity(&self) -> Option<String> {
        [&self.guid, &self.link, &self.title]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        self.published_date.or(self.seen_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Article,
    Digest,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Article => "article",
            ItemKind::Digest => "digest",
        }
    }

    /// Rows written before kinds existed carry an empty kind and are articles.
    pub fn from_db(value: &str) -> Self {
        match value {
            "digest" => ItemKind::Digest,
            _ => ItemKind::Article,
        }
    }
}

/// The persisted unit of truth for both fetched articles and generated digests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub body: String,
    pub link: String,
    pub published_text: String,
    pub published_date: Option<DateTime<Utc>>,
    pub origin_feed_title: String,
    pub origin_feed_url: String,

    // User-owned
    pub is_read: bool,
    pub is_bookmarked: bool,

    pub saved_at: Option<DateTime<Utc>>,

    // Written only through the insight setter
    pub ai_summary: String,
    pub ai_tags: Vec<String>,
    pub ai_updated_at: Option<DateTime<Utc>>,

    // Digest only
    pub digest_date: String,
    pub related_ids: Vec<String>,

    #[serde(skip)]
    pub body_hydrated: bool,
}

impl HistoryItem {
    /// A fresh, unread article built from a fetched item.
    pub fn from_source(id: String, source: &SourceItem, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: ItemKind::Article,
            title: source.title.clone(),
            description: source.description.clone(),
            body: source.body.clone(),
            link: source.link.clone(),
            published_text: source.published_text.clone(),
            published_date: source.published_date,
            origin_feed_title: source.origin_feed_title.clone(),
            origin_feed_url: source.origin_feed_url.clone(),
            saved_at: Some(now),
            body_hydrated: true,
            ..Default::default()
        }
    }

    pub fn is_digest(&self) -> bool {
        self.kind == ItemKind::Digest
    }

    /// Published date, falling back to when the item was last saved.
    pub fn effective_date(&self) -> Option<DateTime<Utc>> {
        self.published_date.or(self.saved_at)
    }

    /// Drop the body of an article for a metadata listing. Digests keep theirs.
    pub fn into_metadata(mut self) -> Self {
        if self.is_digest() {
            self.body_hydrated = true;
        } else {
            self.body.clear();
            self.body_hydrated = false;
        }
        self
    }
}

/// Trim, drop empties, and de-duplicate case-insensitively keeping the first spelling.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter_map(|tag| {
            let tag = tag.as_ref().trim();
            if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
                None
            } else {
                Some(tag.to_string())
            }
        })
        .collect()
}
