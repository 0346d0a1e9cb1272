// src/extract/mod.rs
//! Article extraction: download a page and reduce it to plain text, title,
//! authors and an optional publish date.

pub mod html;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub use html::HtmlArticleExtractor;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    pub text: String,
    pub title: String,
    pub authors: Vec<String>,
    /// Always UTC; naive source dates are read as UTC by the parser.
    pub publish_date: Option<DateTime<Utc>>,
}

/// Extraction failures. Every variant except `Unexpected` is a known
/// fetch/parse failure mode.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("unsupported content type `{content_type}` for {url}")]
    NotHtml { content_type: String, url: String },
    #[error("no article text found at {url}")]
    EmptyArticle { url: String },
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ExtractError {
    /// `false` only for failures outside the known fetch/parse modes.
    pub fn is_typed(&self) -> bool {
        !matches!(self, ExtractError::Unexpected(_))
    }
}

#[async_trait]
pub trait ArticleExtractor: Send + Sync {
    /// Fetch and parse `url`; `language` is a hint such as `"pt"`.
    async fn extract(&self, url: &str, language: &str) -> Result<Article, ExtractError>;

    fn name(&self) -> &'static str;
}

// --- Test helper ---
/// Extractor answering from a fixed URL → outcome table; unknown URLs fail
/// with `EmptyArticle`. Also records every requested URL.
#[derive(Default)]
pub struct StaticExtractor {
    pages: HashMap<String, Result<Article, String>>,
    calls: Mutex<Vec<String>>,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_article(mut self, url: &str, article: Article) -> Self {
        self.pages.insert(url.to_string(), Ok(article));
        self
    }

    /// Make `url` fail with an `Unexpected` error carrying `message`.
    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.pages.insert(url.to_string(), Err(message.to_string()));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ArticleExtractor for StaticExtractor {
    async fn extract(&self, url: &str, _language: &str) -> Result<Article, ExtractError> {
        self.calls.lock().push(url.to_string());
        match self.pages.get(url) {
            Some(Ok(article)) => Ok(article.clone()),
            Some(Err(msg)) => Err(ExtractError::Unexpected(anyhow::anyhow!(msg.clone()))),
            None => Err(ExtractError::EmptyArticle {
                url: url.to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
