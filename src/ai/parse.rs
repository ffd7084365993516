//! Lenient decoding of model output.
//!
//! Models wrap JSON in code fences, prepend prose, or get one entry wrong.
//! Decoding pulls out the JSON payload and keeps every entry that
//! deserializes, dropping the rest.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DigestTopic, FeedGroup, Insight};

fn fence_re() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence pattern is valid")
    })
}

/// The JSON payload inside `text`: a fenced block if there is one, else the
/// span from the first `{`/`[` to the last matching closer.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(inner) = fence_re().captures(text).and_then(|c| c.get(1)) {
        let inner = inner.as_str().trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }

    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

fn payload(text: &str) -> Result<Value> {
    let json = extract_json(text).ok_or_else(|| {
        AppError::Other(anyhow::anyhow!("no JSON found in generator output"))
    })?;
    Ok(serde_json::from_str(json)?)
}

/// Entries of a list that may be bare or wrapped as `{"<key>": [...]}`.
fn entries<T: DeserializeOwned>(value: Value, key: &str) -> Vec<T> {
    let list = match value {
        Value::Array(list) => list,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(list)) => list,
            _ => vec![Value::Object(map)],
        },
        _ => Vec::new(),
    };

    list.into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Dropping malformed {} entry: {}", key, e);
                None
            }
        })
        .collect()
}

pub fn parse_topics(text: &str) -> Result<Vec<DigestTopic>> {
    Ok(entries(payload(text)?, "topics"))
}

pub fn parse_groups(text: &str) -> Result<Vec<FeedGroup>> {
    Ok(entries(payload(text)?, "groups"))
}

/// A JSON `{summary, tags}` object, or the whole reply as the summary when
/// the model answered in plain prose.
pub fn parse_insight(text: &str) -> Result<Insight> {
    match extract_json(text).map(|json| serde_json::from_str::<Insight>(json)) {
        Some(Ok(insight)) => Ok(insight),
        _ => Ok(Insight {
            summary: text.trim().to_string(),
            tags: Vec::new(),
        }),
    }
}
