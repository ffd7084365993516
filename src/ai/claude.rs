use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DigestTopic, FeedDescriptor, FeedGroup, HistoryItem, Insight, InsightRequest};

use super::{parse, FeedGroupGenerator, InsightGenerator, TopicGenerator};

const CLAUDE_API_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

const MAX_ARTICLE_CHARS: usize = 10_000;
const MAX_DIGEST_EXCERPT_CHARS: usize = 600;

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct DigestArticle<'a> {
    id: &'a str,
    title: &'a str,
    feed: &'a str,
    excerpt: String,
}

/// Anthropic Messages API backend for every generator capability.
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: CLAUDE_API_URL.to_string(),
        })
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model_version(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_message: String,
        max_tokens: u32,
    ) -> Result<String> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message,
            }],
            system: Some(system_prompt.to_string()),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::ClaudeApi(format!("HTTP {}: {}", status, error_text)));
        }

        let message_response: MessageResponse = response.json().await?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(text)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[async_trait]
impl InsightGenerator for ClaudeClient {
    async fn generate_insight(&self, request: &InsightRequest) -> Result<Insight> {
        let system_prompt = r#"You summarize news articles.
Reply with a JSON object: {"summary": "...", "tags": ["..."]}.
The summary is 2-3 short paragraphs covering the key facts and conclusions.
Give 3 to 6 short topical tags."#;

        let user_message = format!(
            "Title: {}\nFeed: {}\nLink: {}\n\nContent:\n{}",
            request.title,
            request.feed_title,
            request.link,
            truncate_chars(&request.body, MAX_ARTICLE_CHARS)
        );

        let text = self.complete(system_prompt, user_message, 1024).await?;
        parse::parse_insight(&text)
    }
}

#[async_trait]
impl TopicGenerator for ClaudeClient {
    async fn generate_topics(
        &self,
        date_key: &str,
        articles: &[HistoryItem],
    ) -> Result<Vec<DigestTopic>> {
        let system_prompt = r#"You build a daily news digest.
Group the given articles into the most important topics of the day.
Reply with a JSON array only. Each element:
{"title": "...", "summary": "...", "tags": ["..."], "article_ids": ["<id from input>"]}
Only use article ids that appear in the input."#;

        let listing: Vec<DigestArticle> = articles
            .iter()
            .map(|item| DigestArticle {
                id: &item.id,
                title: &item.title,
                feed: &item.origin_feed_title,
                excerpt: truncate_chars(
                    if item.body.is_empty() { &item.description } else { &item.body },
                    MAX_DIGEST_EXCERPT_CHARS,
                )
                .to_string(),
            })
            .collect();

        let user_message = format!(
            "Date: {}\nArticles:\n{}",
            date_key,
            serde_json::to_string_pretty(&listing)?
        );

        let text = self.complete(system_prompt, user_message, 4096).await?;
        parse::parse_topics(&text)
    }
}

#[async_trait]
impl FeedGroupGenerator for ClaudeClient {
    async fn generate_groups(&self, feeds: &[FeedDescriptor]) -> Result<Vec<FeedGroup>> {
        let system_prompt = r#"You organize RSS subscriptions.
Sort the given feeds into a handful of named groups.
Reply with a JSON array only. Each element: {"name": "...", "feed_urls": ["<url from input>"]}"#;

        let user_message = format!("Feeds:\n{}", serde_json::to_string_pretty(feeds)?);

        let text = self.complete(system_prompt, user_message, 2048).await?;
        parse::parse_groups(&text)
    }
}
