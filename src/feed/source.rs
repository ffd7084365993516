use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::Client;
use url::Url;

use crate::error::Result;
use crate::models::SourceItem;

/// Something that turns a feed URL into structured items.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<SourceItem>>;
}

/// RSS/Atom over HTTP, parsed with `feed-rs`.
pub struct HttpFeedSource {
    client: Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("digest-reader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<SourceItem>> {
        let parsed =
            Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid feed URL {}: {}", url, e))?;
        let response = self.client.get(parsed).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = parse_feed(&bytes)?;
        let feed_title = feed.title.map(|t| t.content).unwrap_or_default();

        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let summary_html = entry.summary.as_ref().map(|s| s.content.as_str());
                // Try content first, then fall back to summary
                let content_html = entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.as_deref())
                    .or(summary_html);
                let published = entry.published.or(entry.updated);

                SourceItem {
                    guid: entry.id,
                    link: entry
                        .links
                        .first()
                        .map(|l| l.href.clone())
                        .unwrap_or_default(),
                    title: entry.title.map(|t| t.content).unwrap_or_default(),
                    published_text: published.map(|dt| dt.to_rfc2822()).unwrap_or_default(),
                    published_date: published,
                    description: summary_html.map(html_to_text).unwrap_or_default(),
                    body: content_html.map(html_to_text).unwrap_or_default(),
                    origin_feed_url: url.to_string(),
                    origin_feed_title: feed_title.clone(),
                    seen_at: None,
                }
            })
            .collect();

        Ok(items)
    }
}

/// Entries without a guid keep an empty id so identity falls back to the link.
fn parse_feed(bytes: &[u8]) -> Result<Feed> {
    let parser = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build();
    Ok(parser.parse(bytes)?)
}

fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 80) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            html.trim().to_string()
        }
    }
}
