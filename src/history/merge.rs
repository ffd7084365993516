use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{HistoryItem, ItemKind, SourceItem};

/// Reconcile freshly fetched items into `existing`, returning the items that
/// were created or changed and therefore need persisting.
///
/// Only fetch-provided fields, `saved_at` and `body_hydrated` are ever
/// written. Read/bookmark state and AI annotations are left alone, and ids
/// that already belong to a digest are never reinterpreted as articles.
pub fn merge(
    existing: &mut HashMap<String, HistoryItem>,
    fresh: &[SourceItem],
    now: DateTime<Utc>,
) -> Vec<HistoryItem> {
    let mut changed_ids: Vec<String> = Vec::new();

    for source in fresh {
        let Some(id) = source.identity() else {
            tracing::debug!(
                "Dropping item without guid, link or title from {}",
                source.origin_feed_url
            );
            continue;
        };

        match existing.get_mut(&id) {
            None => {
                existing.insert(id.clone(), HistoryItem::from_source(id.clone(), source, now));
                push_unique(&mut changed_ids, id);
            }
            Some(item) if item.kind == ItemKind::Digest => {
                tracing::warn!("Fetched item {} collides with a digest id, skipped", id);
            }
            Some(item) => {
                if apply_update(item, source, now) {
                    push_unique(&mut changed_ids, id);
                }
            }
        }
    }

    changed_ids
        .iter()
        .filter_map(|id| existing.get(id).cloned())
        .collect()
}

fn push_unique(ids: &mut Vec<String>, id: String) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

fn update_text(field: &mut String, fresh: &str) -> bool {
    if !fresh.is_empty() && field != fresh {
        *field = fresh.to_string();
        true
    } else {
        false
    }
}

fn apply_update(item: &mut HistoryItem, source: &SourceItem, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    changed |= update_text(&mut item.title, &source.title);
    changed |= update_text(&mut item.description, &source.description);
    changed |= update_text(&mut item.body, &source.body);
    changed |= update_text(&mut item.link, &source.link);
    changed |= update_text(&mut item.published_text, &source.published_text);
    changed |= update_text(&mut item.origin_feed_title, &source.origin_feed_title);
    changed |= update_text(&mut item.origin_feed_url, &source.origin_feed_url);

    if source.published_date.is_some() && item.published_date != source.published_date {
        item.published_date = source.published_date;
        changed = true;
    }
    if item.saved_at != Some(now) {
        item.saved_at = Some(now);
        changed = true;
    }
    item.body_hydrated = true;

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn fetched(guid: &str, title: &str, body: &str) -> SourceItem {
        SourceItem {
            guid: guid.to_string(),
            link: format!("https://example.com/{guid}"),
            title: title.to_string(),
            body: body.to_string(),
            origin_feed_url: "https://example.com/feed".to_string(),
            origin_feed_title: "Example".to_string(),
            published_date: Some(now() - Duration::hours(2)),
            ..Default::default()
        }
    }

    #[test]
    fn new_items_are_created_unread_and_hydrated() {
        let mut history = HashMap::new();
        let changed = merge(&mut history, &[fetched("g1", "Hello", "Body")], now());

        assert_eq!(changed.len(), 1);
        let item = &history["g1"];
        assert_eq!(item.kind, ItemKind::Article);
        assert!(!item.is_read);
        assert!(item.body_hydrated);
        assert_eq!(item.saved_at, Some(now()));
        assert_eq!(item.origin_feed_title, "Example");
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let batch = vec![fetched("g1", "Hello", "Body"), fetched("g2", "World", "Body 2")];
        let mut history = HashMap::new();

        assert_eq!(merge(&mut history, &batch, now()).len(), 2);
        let after_first = history.clone();

        assert!(merge(&mut history, &batch, now()).is_empty());
        assert_eq!(history, after_first);
    }

    #[test]
    fn user_state_survives_changed_source() {
        let mut history = HashMap::new();
        merge(&mut history, &[fetched("g1", "Hello", "Body")], now());

        {
            let item = history.get_mut("g1").unwrap();
            item.is_read = true;
            item.is_bookmarked = true;
            item.ai_summary = "summary".to_string();
            item.ai_tags = vec!["tag".to_string()];
            item.ai_updated_at = Some(now());
        }

        let later = now() + Duration::minutes(30);
        let changed = merge(&mut history, &[fetched("g1", "Hello, edited", "New body")], later);

        assert_eq!(changed.len(), 1);
        let item = &changed[0];
        assert_eq!(item.title, "Hello, edited");
        assert_eq!(item.body, "New body");
        assert_eq!(item.saved_at, Some(later));
        assert!(item.is_read);
        assert!(item.is_bookmarked);
        assert_eq!(item.ai_summary, "summary");
        assert_eq!(item.ai_tags, vec!["tag"]);
        assert_eq!(item.ai_updated_at, Some(now()));
    }

    #[test]
    fn empty_fresh_fields_do_not_clobber() {
        let mut history = HashMap::new();
        merge(&mut history, &[fetched("g1", "Hello", "Body")], now());

        let mut sparse = fetched("g1", "", "");
        sparse.published_date = None;
        sparse.origin_feed_title.clear();
        merge(&mut history, &[sparse], now() + Duration::minutes(5));

        let item = &history["g1"];
        assert_eq!(item.title, "Hello");
        assert_eq!(item.body, "Body");
        assert_eq!(item.origin_feed_title, "Example");
        assert!(item.published_date.is_some());
    }

    #[test]
    fn identity_fallback_and_drop() {
        let mut history = HashMap::new();
        let by_link = SourceItem {
            link: "https://example.com/only-link".to_string(),
            title: "Linked".to_string(),
            ..Default::default()
        };
        let by_title = SourceItem {
            title: "Only a title".to_string(),
            ..Default::default()
        };
        let anonymous = SourceItem {
            body: "orphan".to_string(),
            ..Default::default()
        };

        let changed = merge(&mut history, &[by_link, by_title, anonymous], now());

        assert_eq!(changed.len(), 2);
        assert_eq!(history.len(), 2);
        assert!(history.contains_key("https://example.com/only-link"));
        assert!(history.contains_key("Only a title"));
    }

    #[test]
    fn digest_ids_are_never_reinterpreted() {
        let mut history = HashMap::new();
        history.insert(
            "digest:2026-04-01:000".to_string(),
            HistoryItem {
                id: "digest:2026-04-01:000".to_string(),
                kind: ItemKind::Digest,
                title: "Topic".to_string(),
                ..Default::default()
            },
        );

        let collision = SourceItem {
            guid: "digest:2026-04-01:000".to_string(),
            title: "Imposter".to_string(),
            ..Default::default()
        };
        let changed = merge(&mut history, &[collision], now());

        assert!(changed.is_empty());
        assert_eq!(history["digest:2026-04-01:000"].title, "Topic");
    }

    #[test]
    fn duplicate_ids_in_one_batch_are_reported_once() {
        let mut history = HashMap::new();
        let changed = merge(
            &mut history,
            &[fetched("g1", "First", "Body"), fetched("g1", "Second", "Body")],
            now(),
        );

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].title, "Second");
    }
}
