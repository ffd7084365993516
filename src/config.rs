use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::db::DigestReplacePolicy;
use crate::digest::DigestSettings;
use crate::error::{AppError, Result};
use crate::models::FetchOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// History store. A legacy `.jsonl` path is redirected to the `.db` next to it.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub feeds: Vec<String>,

    /// Extra subscriptions read from an OPML file.
    pub opml_path: Option<String>,

    /// IANA zone used for "today".
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_per_source_timeout")]
    pub per_source_timeout_secs: u64,

    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    #[serde(default = "default_digest_max_articles")]
    pub digest_max_articles: usize,

    #[serde(default)]
    pub digest_replace_policy: DigestReplacePolicy,

    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_secs: u64,

    pub claude_api_key: Option<String>,
    pub claude_model: Option<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("digest-reader");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("history.db").to_string_lossy().to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_per_source_timeout() -> u64 {
    15
}

fn default_batch_timeout() -> u64 {
    60
}

fn default_digest_max_articles() -> usize {
    80
}

fn default_ai_timeout() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            feeds: Vec::new(),
            opml_path: None,
            timezone: default_timezone(),
            per_source_timeout_secs: default_per_source_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            digest_max_articles: default_digest_max_articles(),
            digest_replace_policy: DigestReplacePolicy::default(),
            ai_timeout_secs: default_ai_timeout(),
            claude_api_key: None,
            claude_model: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.tz()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("digest-reader")
            .join("config.toml")
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| AppError::Config(format!("unknown timezone {:?}", self.timezone)))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            per_source_timeout: Duration::from_secs(self.per_source_timeout_secs),
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
        }
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn digest_settings(&self) -> DigestSettings {
        DigestSettings {
            max_articles: self.digest_max_articles,
            generation_timeout: self.ai_timeout(),
            replace_policy: self.digest_replace_policy,
        }
    }
}
