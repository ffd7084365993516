//! Daily digest: reuse today's stored topics or generate them once.
//!
//! Topics are cached per calendar day in the display timezone. A forced build
//! always asks the generator again. Builds for the same day are serialized
//! behind a per-date lock, and a caller that waited re-reads the cache before
//! generating.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::ai::{validate_topics, TopicGenerator};
use crate::clock::Clock;
use crate::db::{DigestReplacePolicy, HistoryStore};
use crate::error::{AppError, Result};
use crate::models::{normalize_tags, DailyDigest, DigestTopic, HistoryItem, ItemKind};

const DIGEST_FEED_TITLE: &str = "Daily digest";
const DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct DigestSettings {
    pub max_articles: usize,
    pub generation_timeout: Duration,
    pub replace_policy: DigestReplacePolicy,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            max_articles: 80,
            generation_timeout: Duration::from_secs(120),
            replace_policy: DigestReplacePolicy::default(),
        }
    }
}

pub struct DigestCache {
    store: Arc<HistoryStore>,
    generator: Arc<dyn TopicGenerator>,
    clock: Arc<dyn Clock>,
    settings: DigestSettings,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DigestCache {
    pub fn new(
        store: Arc<HistoryStore>,
        generator: Arc<dyn TopicGenerator>,
        clock: Arc<dyn Clock>,
        settings: DigestSettings,
    ) -> Self {
        Self {
            store,
            generator,
            clock,
            settings,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Today's digest. `feeds` restricts the source articles (empty = all).
    pub async fn build_daily(&self, feeds: &[String], force: bool) -> Result<DailyDigest> {
        let date_key = self.clock.today_key();

        if !force {
            if let Some(cached) = self.cached(&date_key).await? {
                return Ok(cached);
            }
        }

        let slot = self.slot(&date_key);
        let _guard = slot.lock().await;

        if !force {
            if let Some(cached) = self.cached(&date_key).await? {
                return Ok(cached);
            }
        }

        let articles = self
            .store
            .load_today_articles(
                &date_key,
                feeds,
                self.settings.max_articles,
                self.clock.timezone(),
            )
            .await?;
        if articles.is_empty() {
            tracing::info!("No articles for {}, nothing to digest", date_key);
            return Err(AppError::NoValidOutput("digest topics"));
        }

        tracing::info!("Generating digest for {} from {} articles", date_key, articles.len());
        let topics = tokio::time::timeout(
            self.settings.generation_timeout,
            self.generator.generate_topics(&date_key, &articles),
        )
        .await
        .map_err(|_| AppError::Timeout(format!("generating digest for {date_key}")))??;

        let offered = topics.len();
        let known: HashSet<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        let topics = validate_topics(topics, &known);
        if topics.is_empty() {
            tracing::error!("Digest generator returned {} topics, none usable", offered);
            return Err(AppError::NoValidOutput("digest topics"));
        }

        let now = self.clock.now();
        let items: Vec<HistoryItem> = topics
            .into_iter()
            .enumerate()
            .map(|(ordinal, topic)| digest_item(&date_key, ordinal, topic, now))
            .collect();

        let items = self
            .store
            .replace_digest_items_by_date_with(&date_key, items, self.settings.replace_policy)
            .await?;

        Ok(DailyDigest {
            date_key,
            items,
            used_cache: false,
        })
    }

    async fn cached(&self, date_key: &str) -> Result<Option<DailyDigest>> {
        let items = self.store.load_digest_items_by_date(date_key).await?;
        if items.is_empty() {
            return Ok(None);
        }
        tracing::info!("Using {} cached digest topics for {}", items.len(), date_key);
        Ok(Some(DailyDigest {
            date_key: date_key.to_string(),
            items,
            used_cache: true,
        }))
    }

    pub fn replace_policy(&self) -> DigestReplacePolicy {
        self.settings.replace_policy
    }

    fn slot(&self, date_key: &str) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // Forget locks nobody holds or waits on
        in_flight.retain(|key, slot| key == date_key || Arc::strong_count(slot) > 1);
        Arc::clone(in_flight.entry(date_key.to_string()).or_default())
    }
}

/// Stable per-slot id: regenerating a day rewrites the same rows.
pub fn digest_id(date_key: &str, ordinal: usize) -> String {
    format!("{}:{}:{:03}", ItemKind::Digest.as_str(), date_key, ordinal)
}

fn digest_item(
    date_key: &str,
    ordinal: usize,
    topic: DigestTopic,
    now: DateTime<Utc>,
) -> HistoryItem {
    let description = match topic.summary.char_indices().nth(DESCRIPTION_CHARS) {
        Some((end, _)) => format!("{}…", &topic.summary[..end]),
        None => topic.summary.clone(),
    };

    HistoryItem {
        id: digest_id(date_key, ordinal),
        kind: ItemKind::Digest,
        title: topic.title,
        description,
        body: topic.summary,
        published_text: date_key.to_string(),
        published_date: Some(now),
        origin_feed_title: DIGEST_FEED_TITLE.to_string(),
        saved_at: Some(now),
        ai_tags: normalize_tags(&topic.tags),
        digest_date: date_key.to_string(),
        related_ids: topic.article_ids,
        body_hydrated: true,
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    /// Topic generator double that counts calls.
    pub(crate) struct StubTopics {
        pub topics: Vec<DigestTopic>,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl StubTopics {
        pub(crate) fn new(topics: Vec<DigestTopic>) -> Self {
            Self {
                topics,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TopicGenerator for StubTopics {
        async fn generate_topics(
            &self,
            _date_key: &str,
            _articles: &[HistoryItem],
        ) -> Result<Vec<DigestTopic>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.topics.clone())
        }
    }

    pub(crate) fn topic(title: &str, summary: &str, ids: &[&str]) -> DigestTopic {
        DigestTopic {
            title: title.to_string(),
            summary: summary.to_string(),
            tags: vec!["News".to_string(), "news".to_string()],
            article_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    async fn setup(
        generator: Arc<StubTopics>,
        settings: DigestSettings,
    ) -> (TempDir, Arc<HistoryStore>, DigestCache) {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = Arc::new(HistoryStore::open(dir.path().join("history.db")).await.unwrap());
        store
            .upsert(vec![HistoryItem {
                id: "a1".into(),
                title: "Fab opens".into(),
                body: "A new chip fab opened.".into(),
                published_date: Some(now() - chrono::Duration::hours(1)),
                ..Default::default()
            }])
            .await
            .unwrap();
        let clock = Arc::new(FixedClock::new(now(), Tz::UTC));
        let cache = DigestCache::new(Arc::clone(&store), generator, clock, settings);
        (dir, store, cache)
    }

    #[tokio::test]
    async fn cache_hit_skips_generator() {
        let generator = Arc::new(StubTopics::new(vec![topic("Chips", "Fabs", &["a1"])]));
        let (_dir, store, cache) = setup(Arc::clone(&generator), DigestSettings::default()).await;
        store
            .replace_digest_items_by_date(
                "2026-05-01",
                vec![HistoryItem {
                    id: digest_id("2026-05-01", 0),
                    title: "Earlier".into(),
                    ..Default::default()
                }],
            )
            .await
            .unwrap();

        let digest = cache.build_daily(&[], false).await.unwrap();

        assert!(digest.used_cache);
        assert_eq!(digest.date_key, "2026-05-01");
        assert_eq!(digest.items[0].title, "Earlier");
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn force_always_generates() {
        let generator = Arc::new(StubTopics::new(vec![topic("Chips", "Fabs", &["a1"])]));
        let (_dir, store, cache) = setup(Arc::clone(&generator), DigestSettings::default()).await;
        store
            .replace_digest_items_by_date(
                "2026-05-01",
                vec![HistoryItem {
                    id: digest_id("2026-05-01", 0),
                    title: "Earlier".into(),
                    ..Default::default()
                }],
            )
            .await
            .unwrap();

        let digest = cache.build_daily(&[], true).await.unwrap();

        assert!(!digest.used_cache);
        assert_eq!(generator.calls(), 1);
        assert_eq!(digest.items[0].title, "Chips");
    }

    #[tokio::test]
    async fn output_is_filtered_then_cached() {
        let generator = Arc::new(StubTopics::new(vec![
            topic("Chips", "Fabs expand", &["a1", "ghost"]),
            topic("", "Untitled topic", &["a1"]),
        ]));
        let (_dir, store, cache) = setup(Arc::clone(&generator), DigestSettings::default()).await;

        let digest = cache.build_daily(&[], false).await.unwrap();

        assert!(!digest.used_cache);
        assert_eq!(digest.items.len(), 1);
        let item = &digest.items[0];
        assert_eq!(item.id, "digest:2026-05-01:000");
        assert_eq!(item.kind, ItemKind::Digest);
        assert_eq!(item.digest_date, "2026-05-01");
        assert_eq!(item.related_ids, vec!["a1"]);
        assert_eq!(item.ai_tags, vec!["News"]);

        let stored = store.load_digest_items_by_date("2026-05-01").await.unwrap();
        assert_eq!(stored.len(), 1);

        let again = cache.build_daily(&[], false).await.unwrap();
        assert!(again.used_cache);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn no_valid_topics_writes_nothing() {
        let generator = Arc::new(StubTopics::new(vec![topic("Ghost", "Made up", &["nope"])]));
        let (_dir, store, cache) = setup(Arc::clone(&generator), DigestSettings::default()).await;

        let result = cache.build_daily(&[], false).await;

        assert!(matches!(result, Err(AppError::NoValidOutput(_))));
        assert!(store.load_digest_items_by_date("2026-05-01").await.unwrap().is_empty());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn prune_policy_drops_stale_slots_on_regeneration() {
        let generator = Arc::new(StubTopics::new(vec![topic("Only one", "now", &["a1"])]));
        let (_dir, store, cache) = setup(Arc::clone(&generator), DigestSettings::default()).await;
        store
            .replace_digest_items_by_date(
                "2026-05-01",
                vec![
                    HistoryItem {
                        id: digest_id("2026-05-01", 0),
                        title: "Old 0".into(),
                        ..Default::default()
                    },
                    HistoryItem {
                        id: digest_id("2026-05-01", 1),
                        title: "Old 1".into(),
                        ..Default::default()
                    },
                ],
            )
            .await
            .unwrap();

        cache.build_daily(&[], true).await.unwrap();

        let stored = store.load_digest_items_by_date("2026-05-01").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Only one");
    }

    #[tokio::test]
    async fn held_locks_survive_other_dates() {
        let (_dir, _store, cache) =
            setup(Arc::new(StubTopics::new(Vec::new())), DigestSettings::default()).await;

        let yesterday = cache.slot("2026-04-30");
        let _today = cache.slot("2026-05-01");
        assert!(Arc::ptr_eq(&yesterday, &cache.slot("2026-04-30")));

        drop(yesterday);
        let _today_again = cache.slot("2026-05-01");
        let in_flight = cache.in_flight.lock().unwrap();
        assert_eq!(in_flight.len(), 1);
        assert!(in_flight.contains_key("2026-05-01"));
    }

    #[tokio::test]
    async fn concurrent_builds_generate_once() {
        let mut stub = StubTopics::new(vec![topic("Chips", "Fabs", &["a1"])]);
        stub.delay = Duration::from_millis(100);
        let generator = Arc::new(stub);
        let (_dir, _store, cache) = setup(Arc::clone(&generator), DigestSettings::default()).await;

        let (first, second) = tokio::join!(
            cache.build_daily(&[], false),
            cache.build_daily(&[], false)
        );

        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(generator.calls(), 1);
        assert!(first.used_cache != second.used_cache);
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let mut stub = StubTopics::new(vec![topic("Chips", "Fabs", &["a1"])]);
        stub.delay = Duration::from_secs(30);
        let settings = DigestSettings {
            generation_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (_dir, _store, cache) = setup(Arc::new(stub), settings).await;

        assert!(matches!(
            cache.build_daily(&[], false).await,
            Err(AppError::Timeout(_))
        ));
    }
}
