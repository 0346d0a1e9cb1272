// src/config/service.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::relevance::{parse_threshold_env, DEFAULT_RELEVANCE_THRESHOLD};
use crate::store::retry::RetryPolicy;

pub const DEFAULT_SERVICE_CONFIG_PATH: &str = "config/scraper.toml";
pub const ENV_SERVICE_CONFIG_PATH: &str = "SCRAPER_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl StoreBackend {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Unsupported store backend: {other}")),
        }
    }
}

fn default_collection() -> String {
    "monitor_results".to_string()
}
fn default_log_collection() -> String {
    "system_logs".to_string()
}
fn default_task() -> String {
    "url_scraping".to_string()
}
fn default_batch_size() -> usize {
    5
}
fn default_max_per_run() -> usize {
    5
}
fn default_batch_pause_ms() -> u64 {
    1_000
}
fn default_threshold() -> f64 {
    DEFAULT_RELEVANCE_THRESHOLD
}
fn default_language() -> String {
    "pt".to_string()
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_extraction_timeout_secs() -> u64 {
    30
}
fn default_max_content_chars() -> usize {
    50_000
}
fn default_max_authors() -> usize {
    10
}
fn default_max_error_chars() -> usize {
    500
}
fn default_backend() -> StoreBackend {
    StoreBackend::Firestore
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Collection holding URL records.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Collection holding run logs.
    #[serde(default = "default_log_collection")]
    pub log_collection: String,
    /// Fixed `task` label written on every run log.
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Safety cap on records handled per triggered run.
    #[serde(default = "default_max_per_run")]
    pub max_per_run: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Inclusive pass threshold on the pre-extraction score.
    #[serde(default = "default_threshold")]
    pub relevance_threshold: f64,
    /// Language hint passed to the extractor.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 0 disables the per-extraction timeout.
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_max_authors")]
    pub max_authors: usize,
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
    #[serde(default = "default_backend")]
    pub store_backend: StoreBackend,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            log_collection: default_log_collection(),
            task: default_task(),
            batch_size: default_batch_size(),
            max_per_run: default_max_per_run(),
            batch_pause_ms: default_batch_pause_ms(),
            relevance_threshold: default_threshold(),
            language: default_language(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            max_content_chars: default_max_content_chars(),
            max_authors: default_max_authors(),
            max_error_chars: default_max_error_chars(),
            store_backend: default_backend(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ServiceConfig = toml::from_str(s).context("parsing service config TOML")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading service config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// File (`$SCRAPER_CONFIG_PATH` or `config/scraper.toml`, defaults when
    /// absent) with env overrides applied on top.
    pub fn load() -> Result<Self> {
        let explicit = env::var(ENV_SERVICE_CONFIG_PATH).ok().map(PathBuf::from);
        let base = match explicit {
            Some(p) => Self::load_from_file(&p)?,
            None => {
                let p = PathBuf::from(DEFAULT_SERVICE_CONFIG_PATH);
                if p.exists() {
                    Self::load_from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        base.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<usize>("SCRAPER_BATCH_SIZE")? {
            self.batch_size = v;
        }
        if let Some(v) = env_parse::<usize>("SCRAPER_MAX_PER_RUN")? {
            self.max_per_run = v;
        }
        if let Some(v) = env_parse::<u64>("SCRAPER_BATCH_PAUSE_MS")? {
            self.batch_pause_ms = v;
        }
        if let Some(v) = env_parse::<u64>("SCRAPER_EXTRACTION_TIMEOUT_SECS")? {
            self.extraction_timeout_secs = v;
        }
        if let Ok(v) = env::var("SCRAPER_LANGUAGE") {
            self.language = v;
        }
        if let Ok(v) = env::var("STORE_BACKEND") {
            self.store_backend = StoreBackend::parse(&v)?;
        }
        if let Some(t) = parse_threshold_env(env::var(crate::relevance::ENV_RELEVANCE_THRESHOLD).ok())
        {
            self.relevance_threshold = t;
        }
        Ok(self.sanitized())
    }

    fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if !self.relevance_threshold.is_finite() {
            self.relevance_threshold = DEFAULT_RELEVANCE_THRESHOLD;
        }
        self.relevance_threshold = self.relevance_threshold.clamp(0.0, 1.0);
        if self.retry_attempts == 0 {
            self.retry_attempts = 1;
        }
        self.language = self.language.trim().to_string();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// `None` when disabled.
    pub fn extraction_timeout(&self) -> Option<Duration> {
        (self.extraction_timeout_secs > 0).then(|| Duration::from_secs(self.extraction_timeout_secs))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {name}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}
