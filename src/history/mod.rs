//! In-memory history: the single mutable copy of every known item.
//!
//! `History` is owned by [`App`](crate::app::App) and only mutated through its
//! methods. Readers get cloned snapshots, never references into the map.

mod merge;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

pub use merge::merge;

use crate::models::{normalize_tags, ArticleFilter, HistoryItem, SourceItem};

#[derive(Debug, Default)]
pub struct History {
    items: HashMap<String, HistoryItem>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: HashMap<String, HistoryItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<HistoryItem> {
        self.items.get(id).cloned()
    }

    /// Merge fetched items; returns what must be persisted.
    pub fn merge(&mut self, fresh: &[SourceItem], now: DateTime<Utc>) -> Vec<HistoryItem> {
        merge(&mut self.items, fresh, now)
    }

    /// Put a store-loaded item in place, e.g. after hydrating it.
    pub fn put(&mut self, item: HistoryItem) {
        self.items.insert(item.id.clone(), item);
    }

    /// Make `items` the complete digest of `digest_date`, dropping any other
    /// digest held for that date.
    pub fn replace_digests(&mut self, digest_date: &str, items: &[HistoryItem]) {
        self.items.retain(|_, item| !item.is_digest() || item.digest_date != digest_date);
        for item in items {
            self.put(item.clone());
        }
    }

    pub fn set_read(&mut self, id: &str, is_read: bool) -> Option<HistoryItem> {
        let item = self.items.get_mut(id)?;
        item.is_read = is_read;
        Some(item.clone())
    }

    pub fn toggle_bookmark(&mut self, id: &str) -> Option<HistoryItem> {
        let item = self.items.get_mut(id)?;
        item.is_bookmarked = !item.is_bookmarked;
        Some(item.clone())
    }

    pub fn apply_insight(
        &mut self,
        id: &str,
        summary: &str,
        tags: &[String],
        updated_at: DateTime<Utc>,
    ) -> Option<HistoryItem> {
        let item = self.items.get_mut(id)?;
        item.ai_summary = summary.to_string();
        item.ai_tags = normalize_tags(tags);
        item.ai_updated_at = Some(updated_at);
        Some(item.clone())
    }

    /// Articles matching `filter`, newest first.
    pub fn articles(&self, filter: ArticleFilter) -> Vec<HistoryItem> {
        let mut items: Vec<HistoryItem> = self
            .items
            .values()
            .filter(|item| !item.is_digest() && filter.matches(item))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.effective_date()
                .cmp(&a.effective_date())
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    pub fn digests_for(&self, digest_date: &str) -> Vec<HistoryItem> {
        let mut items: Vec<HistoryItem> = self
            .items
            .values()
            .filter(|item| item.is_digest() && item.digest_date == digest_date)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Articles a digest refers to. References to ids that are gone are skipped.
    pub fn related(&self, digest: &HistoryItem) -> Vec<HistoryItem> {
        digest
            .related_ids
            .iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect()
    }
}
