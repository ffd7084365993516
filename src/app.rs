use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::ai::{
    validate_groups, validate_insight, ClaudeClient, FeedGroupGenerator, InsightGenerator,
    TopicGenerator,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{DigestReplacePolicy, HistoryStore};
use crate::digest::{DigestCache, DigestSettings};
use crate::error::{AppError, Result};
use crate::feed::{parse_opml_file, FeedSource, FetchBatch, FetchCoordinator, HttpFeedSource};
use crate::history::History;
use crate::models::{
    normalize_tags, ArticleFilter, DailyDigest, FeedDescriptor, FeedGroup, FetchOptions,
    FetchReport, HistoryItem, InsightRequest, SourceItem,
};

/// A mutation that has already been applied in memory, plus the outcome of
/// writing it to the store. A failed write means the display is current but
/// the change may not survive a restart; the caller decides whether to warn or retry.
#[derive(Debug)]
pub struct WriteAck<T> {
    pub value: T,
    pub persisted: Result<()>,
}

impl<T> WriteAck<T> {
    fn new(value: T, persisted: Result<()>) -> Self {
        if let Err(e) = &persisted {
            tracing::warn!("Change applied in memory but not persisted: {}", e);
        }
        Self { value, persisted }
    }

    pub fn is_durable(&self) -> bool {
        self.persisted.is_ok()
    }

    pub fn into_result(self) -> Result<T> {
        self.persisted.map(|_| self.value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshSummary {
    pub report: FetchReport,
    pub changed: usize,
}

/// Collaborators the app is built from. Absent AI capabilities are `None`.
pub struct Services {
    pub store: Arc<HistoryStore>,
    pub source: Arc<dyn FeedSource>,
    pub clock: Arc<dyn Clock>,
    pub insight: Option<Arc<dyn InsightGenerator>>,
    pub topics: Option<Arc<dyn TopicGenerator>>,
    pub groups: Option<Arc<dyn FeedGroupGenerator>>,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub feeds: Vec<FeedDescriptor>,
    pub fetch: FetchOptions,
    pub ai_timeout: Duration,
    pub digest: DigestSettings,
}

pub struct App {
    // Data
    pub feeds: Vec<FeedDescriptor>,
    history: RwLock<History>,

    // Services
    store: Arc<HistoryStore>,
    coordinator: FetchCoordinator,
    clock: Arc<dyn Clock>,
    insight: Option<Arc<dyn InsightGenerator>>,
    digest: Option<DigestCache>,
    grouper: Option<Arc<dyn FeedGroupGenerator>>,

    fetch_options: FetchOptions,
    ai_timeout: Duration,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.tz()?));
        let store = Arc::new(HistoryStore::open(&config.db_path).await?);
        let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new()?);

        let claude = config
            .claude_api_key
            .as_ref()
            .map(|key| ClaudeClient::new(key.clone(), config.claude_model.clone()))
            .transpose()?
            .map(Arc::new);

        let services = Services {
            store,
            source,
            clock,
            insight: claude.clone().map(|c| c as Arc<dyn InsightGenerator>),
            topics: claude.clone().map(|c| c as Arc<dyn TopicGenerator>),
            groups: claude.map(|c| c as Arc<dyn FeedGroupGenerator>),
        };
        let settings = Settings {
            feeds: subscriptions(config),
            fetch: config.fetch_options(),
            ai_timeout: config.ai_timeout(),
            digest: config.digest_settings(),
        };

        let app = Self::from_services(services, settings);
        app.load_history_metadata().await?;
        Ok(app)
    }

    pub fn from_services(services: Services, settings: Settings) -> Self {
        let digest = services.topics.map(|generator| {
            DigestCache::new(
                Arc::clone(&services.store),
                generator,
                Arc::clone(&services.clock),
                settings.digest,
            )
        });

        Self {
            feeds: settings.feeds,
            history: RwLock::new(History::new()),
            coordinator: FetchCoordinator::new(services.source, Arc::clone(&services.clock)),
            store: services.store,
            clock: services.clock,
            insight: services.insight,
            digest,
            grouper: services.groups,
            fetch_options: settings.fetch,
            ai_timeout: settings.ai_timeout,
        }
    }

    pub fn feed_urls(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.url.clone()).collect()
    }

    pub fn today_key(&self) -> String {
        self.clock.today_key()
    }

    // Fetching

    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<SourceItem>> {
        self.coordinator
            .fetch_one(url, self.fetch_options.per_source_timeout)
            .await
    }

    pub async fn fetch_all(&self, urls: &[String]) -> FetchBatch {
        self.coordinator.fetch_all(urls, self.fetch_options).await
    }

    /// Fetch every subscription and merge the results into history.
    pub async fn refresh_feeds(&self) -> WriteAck<RefreshSummary> {
        let batch = self.fetch_all(&self.feed_urls()).await;
        let merged = self.merge_history(&batch.items).await;
        WriteAck {
            value: RefreshSummary {
                report: batch.report,
                changed: merged.value.len(),
            },
            persisted: merged.persisted,
        }
    }

    // History reads

    /// Replace in-memory history with the store's metadata listing.
    pub async fn load_history_metadata(&self) -> Result<usize> {
        let items = self.store.load_metadata().await?;
        let mut history = self.history.write().await;
        *history = History::from_items(items);
        Ok(history.len())
    }

    /// The item with its full body, hydrating from the store if needed.
    pub async fn load_history_item(&self, id: &str) -> Result<Option<HistoryItem>> {
        if let Some(item) = self.history.read().await.get(id) {
            if item.body_hydrated && !item.body.is_empty() {
                return Ok(Some(item));
            }
        }

        let Some(stored) = self.store.load_by_id(id).await? else {
            return Ok(self.history.read().await.get(id));
        };

        let mut history = self.history.write().await;
        let item = match history.get(id) {
            Some(mut current) => {
                current.body = stored.body;
                current.body_hydrated = true;
                current
            }
            None => stored,
        };
        history.put(item.clone());
        Ok(Some(item))
    }

    pub async fn articles(&self, filter: ArticleFilter) -> Vec<HistoryItem> {
        self.history.read().await.articles(filter)
    }

    pub async fn digests_for(&self, digest_date: &str) -> Vec<HistoryItem> {
        self.history.read().await.digests_for(digest_date)
    }

    pub async fn related(&self, digest: &HistoryItem) -> Vec<HistoryItem> {
        self.history.read().await.related(digest)
    }

    pub async fn load_today_articles(
        &self,
        feeds: &[String],
        limit: usize,
    ) -> Result<Vec<HistoryItem>> {
        self.store
            .load_today_articles(&self.clock.today_key(), feeds, limit, self.clock.timezone())
            .await
    }

    // History writes

    pub async fn merge_history(&self, fresh: &[SourceItem]) -> WriteAck<Vec<HistoryItem>> {
        let mut history = self.history.write().await;
        let changed = history.merge(fresh, self.clock.now());
        let persisted = self.store.upsert(changed.clone()).await.map(|_| ());
        WriteAck::new(changed, persisted)
    }

    pub async fn mark_read(&self, id: &str, is_read: bool) -> WriteAck<Option<HistoryItem>> {
        let mut history = self.history.write().await;
        let snapshot = history.set_read(id, is_read);
        let persisted = self.store.set_read(id, is_read).await;
        WriteAck::new(snapshot, persisted)
    }

    pub async fn toggle_bookmark(&self, id: &str) -> WriteAck<Option<HistoryItem>> {
        let mut history = self.history.write().await;
        let snapshot = history.toggle_bookmark(id);
        let persisted = match &snapshot {
            Some(item) => self.store.set_bookmark(id, item.is_bookmarked).await,
            None => Ok(()),
        };
        WriteAck::new(snapshot, persisted)
    }

    pub async fn apply_insight(
        &self,
        id: &str,
        summary: &str,
        tags: &[String],
    ) -> WriteAck<Option<HistoryItem>> {
        let tags = normalize_tags(tags);
        let now = self.clock.now();
        let mut history = self.history.write().await;
        let snapshot = history.apply_insight(id, summary, &tags, now);
        let persisted = self.store.set_insight(id, summary, &tags, now).await;
        WriteAck::new(snapshot, persisted)
    }

    pub async fn replace_digest_items_by_date(
        &self,
        digest_date: &str,
        items: Vec<HistoryItem>,
    ) -> Result<Vec<HistoryItem>> {
        let mut history = self.history.write().await;
        let stored = self.store.replace_digest_items_by_date(digest_date, items).await?;
        for item in &stored {
            history.put(item.clone());
        }
        Ok(stored)
    }

    // AI features

    /// Summarize and tag one article, then store the result.
    pub async fn generate_insight(&self, id: &str) -> Result<WriteAck<Option<HistoryItem>>> {
        let generator = self
            .insight
            .as_ref()
            .ok_or(AppError::CapabilityUnavailable("AI insight"))?;

        let Some(item) = self.load_history_item(id).await? else {
            return Ok(WriteAck::new(None, Ok(())));
        };

        let request = InsightRequest::from_item(&item);
        let insight = tokio::time::timeout(self.ai_timeout, generator.generate_insight(&request))
            .await
            .map_err(|_| AppError::Timeout(format!("generating insight for {id}")))??;
        let insight = validate_insight(insight)?;

        Ok(self.apply_insight(id, &insight.summary, &insight.tags).await)
    }

    /// Today's digest from the subscribed feeds, cached per day unless `force`.
    pub async fn build_daily(&self, force: bool) -> Result<DailyDigest> {
        let digest = self
            .digest
            .as_ref()
            .ok_or(AppError::CapabilityUnavailable("daily digest"))?;

        let result = digest.build_daily(&self.feed_urls(), force).await?;

        let mut history = self.history.write().await;
        // Cached rows and pruned rebuilds are the date's whole digest
        if result.used_cache || digest.replace_policy() == DigestReplacePolicy::Prune {
            history.replace_digests(&result.date_key, &result.items);
        } else {
            for item in &result.items {
                history.put(item.clone());
            }
        }
        Ok(result)
    }

    pub async fn group_feeds(&self) -> Result<Vec<FeedGroup>> {
        let grouper = self
            .grouper
            .as_ref()
            .ok_or(AppError::CapabilityUnavailable("feed grouping"))?;

        let groups = tokio::time::timeout(self.ai_timeout, grouper.generate_groups(&self.feeds))
            .await
            .map_err(|_| AppError::Timeout("grouping feeds".to_string()))??;

        let known: HashSet<&str> = self.feeds.iter().map(|f| f.url.as_str()).collect();
        let groups = validate_groups(groups, &known);
        if groups.is_empty() {
            return Err(AppError::NoValidOutput("feed groups"));
        }
        Ok(groups)
    }
}

/// Configured feeds followed by OPML entries, without duplicates.
fn subscriptions(config: &Config) -> Vec<FeedDescriptor> {
    let mut feeds: Vec<FeedDescriptor> = config
        .feeds
        .iter()
        .map(|url| FeedDescriptor {
            url: url.trim().to_string(),
            title: String::new(),
        })
        .filter(|f| !f.url.is_empty())
        .collect();

    if let Some(path) = &config.opml_path {
        match parse_opml_file(std::path::Path::new(path)) {
            Ok(listed) => feeds.extend(listed),
            Err(e) => tracing::warn!("Failed to read OPML subscriptions {}: {}", path, e),
        }
    }

    let mut seen = HashSet::new();
    feeds.retain(|f| seen.insert(f.url.clone()));
    feeds
}
