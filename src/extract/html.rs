// src/extract/html.rs
//! HTTP + HTML article extractor (reqwest + scraper).
//!
//! Field sources, first hit wins:
//! - title: `og:title`, JSON-LD `headline`, first `<h1>`, `<title>`
//! - publish date: `article:published_time`, JSON-LD `datePublished`,
//!   `itemprop=datePublished`, `<time datetime>`, `meta[name=date|pubdate]`
//! - authors: JSON-LD `author`, `meta[name=author]`, `article:author`,
//!   `[rel=author]`, `[itemprop=author]` (merged, de-duplicated, in order)
//! - text: `<p>` blocks under `article`, then `main`, then `body`
//!
//! No JavaScript rendering.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{Article, ArticleExtractor, ExtractError};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct HtmlArticleExtractor {
    client: reqwest::Client,
}

impl HtmlArticleExtractor {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(8));
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &str, language: &str) -> Result<String, ExtractError> {
        let response = self
            .client
            .get(url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, accept_language(language))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(ExtractError::NotHtml {
                content_type,
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl ArticleExtractor for HtmlArticleExtractor {
    async fn extract(&self, url: &str, language: &str) -> Result<Article, ExtractError> {
        let html = self.fetch_html(url, language).await?;
        debug!(target: "scrape", bytes = html.len(), "fetched article html");
        parse_article(&html).ok_or_else(|| ExtractError::EmptyArticle {
            url: url.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

/// `pt` → `pt,*;q=0.5`. Basic language ranges admit no wildcard subtags.
fn accept_language(language: &str) -> String {
    let lang = language.trim();
    if lang.is_empty() {
        return "*".to_string();
    }
    format!("{lang},*;q=0.5")
}

/// Parse a full HTML document. `None` when no article text is found.
pub fn parse_article(html: &str) -> Option<Article> {
    let doc = Html::parse_document(html);
    let ld = json_ld_article(&doc);

    let text = article_text(&doc)?;

    let title = meta_content(&doc, r#"meta[property="og:title"]"#)
        .or_else(|| ld.as_ref().and_then(|v| ld_str(v, "headline")))
        .or_else(|| first_text(&doc, "h1"))
        .or_else(|| first_text(&doc, "title"))
        .unwrap_or_default();

    let publish_date = meta_content(&doc, r#"meta[property="article:published_time"]"#)
        .or_else(|| ld.as_ref().and_then(|v| ld_str(v, "datePublished")))
        .or_else(|| meta_content(&doc, r#"meta[itemprop="datePublished"]"#))
        .or_else(|| attr_of(&doc, r#"[itemprop="datePublished"]"#, "datetime"))
        .or_else(|| attr_of(&doc, "time[datetime]", "datetime"))
        .or_else(|| meta_content(&doc, r#"meta[name="date"]"#))
        .or_else(|| meta_content(&doc, r#"meta[name="pubdate"]"#))
        .and_then(|s| parse_date(&s));

    let mut authors = Vec::new();
    if let Some(v) = ld.as_ref() {
        authors.extend(ld_authors(v));
    }
    authors.extend(all_meta_content(&doc, r#"meta[name="author"]"#));
    authors.extend(
        all_meta_content(&doc, r#"meta[property="article:author"]"#)
            .into_iter()
            // profile URLs are not names
            .filter(|a| !a.starts_with("http")),
    );
    authors.extend(all_text(&doc, r#"[rel="author"]"#));
    authors.extend(all_text(&doc, r#"[itemprop="author"]"#));

    Some(Article {
        text,
        title,
        authors: dedup_preserving_order(authors),
        publish_date,
    })
}

fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re.replace_all(s, " ").trim().to_string()
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<String>())
}

fn article_text(doc: &Html) -> Option<String> {
    let p = Selector::parse("p").ok()?;
    for container in ["article", "main", r#"[role="main"]"#, "body"] {
        let Ok(sel) = Selector::parse(container) else {
            continue;
        };
        let Some(root) = doc.select(&sel).next() else {
            continue;
        };
        let paragraphs: Vec<String> = root
            .select(&p)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return Some(paragraphs.join("\n\n"));
        }
    }
    None
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    all_text(doc, css).into_iter().next()
}

fn all_text(doc: &Html, css: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(css) else {
        return Vec::new();
    };
    doc.select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

fn attr_of(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(collapse_ws)
        .find(|s| !s.is_empty())
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    attr_of(doc, css, "content")
}

fn all_meta_content(doc: &Html, css: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(css) else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_ws)
        .filter(|s| !s.is_empty())
        .collect()
}

/// First JSON-LD node that looks like an article (top level, array, or `@graph`).
fn json_ld_article(doc: &Html) -> Option<Value> {
    let sel = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in doc.select(&sel) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        let mut nodes: Vec<Value> = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let graphs: Vec<Value> = nodes
            .iter()
            .filter_map(|n| n.get("@graph").and_then(Value::as_array))
            .flatten()
            .cloned()
            .collect();
        nodes.extend(graphs);
        if let Some(found) = nodes.into_iter().find(is_article_node) {
            return Some(found);
        }
    }
    None
}

fn is_article_node(node: &Value) -> bool {
    let type_matches = |t: &str| t.ends_with("Article") || t == "BlogPosting";
    match node.get("@type") {
        Some(Value::String(t)) => type_matches(t.as_str()),
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).any(type_matches),
        _ => false,
    }
}

/// JSON-LD strings are sometimes entity-encoded by the CMS.
fn ld_str(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(|s| collapse_ws(&html_escape::decode_html_entities(s)))
        .filter(|s| !s.is_empty())
}

fn ld_authors(node: &Value) -> Vec<String> {
    let one = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => v.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    };
    let names: Vec<String> = match node.get("author") {
        Some(Value::Array(items)) => items.iter().filter_map(one).collect(),
        Some(v) => one(v).into_iter().collect(),
        None => Vec::new(),
    };
    names
        .into_iter()
        .map(|s| collapse_ws(&html_escape::decode_html_entities(&s)))
        .filter(|s| !s.is_empty())
        .collect()
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

/// Parse common publish-date shapes into UTC. Values without an offset are UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    // date-only, possibly followed by something we don't understand
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
