use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;

use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::models::{FetchOptions, FetchReport, SourceItem};

use super::FeedSource;

/// Items from every source that answered in time, plus what happened to the rest.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    pub items: Vec<SourceItem>,
    pub report: FetchReport,
}

enum SourceOutcome {
    Items(Vec<SourceItem>),
    Failed(AppError),
    TimedOut,
}

/// Fans URLs out to a [`FeedSource`], one task per URL.
pub struct FetchCoordinator {
    source: Arc<dyn FeedSource>,
    clock: Arc<dyn Clock>,
}

impl FetchCoordinator {
    pub fn new(source: Arc<dyn FeedSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    /// Fetch a single feed. Any failure, including the timeout, is returned as is.
    pub async fn fetch_one(&self, url: &str, timeout: Duration) -> Result<Vec<SourceItem>> {
        match fetch_bounded(self.source.as_ref(), url, timeout).await {
            SourceOutcome::Items(items) => Ok(stamp_seen(items, &*self.clock)),
            SourceOutcome::Failed(e) => Err(e),
            SourceOutcome::TimedOut => Err(AppError::Timeout(format!("fetching {url}"))),
        }
    }

    /// Fetch every URL concurrently.
    ///
    /// Each source is bounded by `per_source_timeout`; the whole call returns
    /// by `batch_timeout`, aborting whatever is still running. A failing or
    /// slow source only shows up in the report. Items come back newest first
    /// (published date, else the time their fetch completed), ties in fetch order.
    pub async fn fetch_all(&self, urls: &[String], options: FetchOptions) -> FetchBatch {
        let mut report = FetchReport {
            requested: urls.len(),
            ..Default::default()
        };
        let deadline = Instant::now() + options.batch_timeout;

        let mut abort_handles = Vec::with_capacity(urls.len());
        let mut pending = FuturesUnordered::new();
        for (index, url) in urls.iter().enumerate() {
            let source = Arc::clone(&self.source);
            let clock = Arc::clone(&self.clock);
            let url = url.clone();
            let per_source_timeout = options.per_source_timeout;

            let handle = tokio::spawn(async move {
                let outcome = match fetch_bounded(source.as_ref(), &url, per_source_timeout).await {
                    SourceOutcome::Items(items) => {
                        SourceOutcome::Items(stamp_seen(items, clock.as_ref()))
                    }
                    other => other,
                };
                (index, url, outcome)
            });
            abort_handles.push(handle.abort_handle());
            pending.push(handle);
        }

        let mut per_source: Vec<Option<Vec<SourceItem>>> = vec![None; urls.len()];
        let mut finished = 0;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok((index, url, outcome)))) => {
                    finished += 1;
                    match outcome {
                        SourceOutcome::Items(items) => {
                            tracing::debug!("Fetched {} items from {}", items.len(), url);
                            report.succeeded += 1;
                            per_source[index] = Some(items);
                        }
                        SourceOutcome::Failed(e) => {
                            tracing::debug!("Failed to fetch {}: {}", url, e);
                            report.failed += 1;
                        }
                        SourceOutcome::TimedOut => {
                            tracing::debug!("Timed out fetching {}", url);
                            report.timed_out += 1;
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    finished += 1;
                    tracing::warn!("Feed fetch task ended abnormally: {}", e);
                    report.failed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    let unfinished = urls.len() - finished;
                    tracing::warn!("Batch timeout hit with {} feeds still pending", unfinished);
                    report.timed_out += unfinished;
                    break;
                }
            }
        }

        let mut items: Vec<SourceItem> = per_source.into_iter().flatten().flatten().collect();
        // Stable, so equal dates keep fetch order
        items.sort_by(|a, b| b.effective_date().cmp(&a.effective_date()));

        tracing::info!("{}", report.status_line());
        FetchBatch { items, report }
    }
}

async fn fetch_bounded(source: &dyn FeedSource, url: &str, timeout: Duration) -> SourceOutcome {
    match tokio::time::timeout(timeout, source.fetch(url)).await {
        Ok(Ok(items)) => SourceOutcome::Items(items),
        Ok(Err(e)) => SourceOutcome::Failed(e),
        Err(_) => SourceOutcome::TimedOut,
    }
}

fn stamp_seen(mut items: Vec<SourceItem>, clock: &dyn Clock) -> Vec<SourceItem> {
    let now = clock.now();
    for item in &mut items {
        item.seen_at.get_or_insert(now);
    }
    items
}
