// src/relevance.rs
//! Relevance scoring for URL candidates: fixed weighted criteria over the
//! discovered metadata, plus a one-time freshness boost after extraction.
//!
//! | criterion                                  | points |
//! |--------------------------------------------|--------|
//! | term in title (case-insensitive substring) | 30     |
//! | term in snippet                            | 10     |
//! | link host in the trusted set               | 25     |
//! | link has neither `?` nor `&`               | 5      |
//! | title has more than 3 tokens               | 10     |
//!
//! The pre-extraction score is `raw / 80`, rounded to 2 decimals.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::domains::{host_of, DomainSets};

// --- env defaults & names ---
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.5;
pub const ENV_RELEVANCE_THRESHOLD: &str = "RELEVANCE_THRESHOLD";

pub const WEIGHT_TERM_IN_TITLE: u32 = 30;
pub const WEIGHT_TERM_IN_SNIPPET: u32 = 10;
pub const WEIGHT_TRUSTED_DOMAIN: u32 = 25;
pub const WEIGHT_CLEAN_URL: u32 = 5;
pub const WEIGHT_DESCRIPTIVE_TITLE: u32 = 10;

/// Sum of the pre-extraction weights.
pub const BASE_POINTS: u32 = 80;
/// Points added after extraction for a recent publish date.
pub const RECENCY_BOOST_POINTS: u32 = 20;
/// Publish dates newer than this (strictly) earn the boost.
pub const RECENCY_WINDOW_DAYS: i64 = 730;

// Dev logging gate: RELEVANCE_DEV_LOG=1 AND dev env (debug or APP_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("RELEVANCE_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("APP_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Short, non-reversible id for a link so logs never carry raw URLs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

// parse optional float env and clamp to <0.0..=1.0>
pub(crate) fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

/// Result of relevance evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Relevance {
    /// Normalized pre-extraction score in [0, 1].
    pub score: f64,
    /// Satisfied points out of [`BASE_POINTS`].
    pub raw: u32,
    /// Ids of the satisfied criteria, in table order.
    pub reasons: Vec<&'static str>,
}

/// Score the discovered metadata of one record.
pub fn evaluate(
    term: &str,
    title: &str,
    snippet: &str,
    link: &str,
    domains: &DomainSets,
) -> Relevance {
    let term = term.to_lowercase();
    let title = title.to_lowercase();
    let snippet = snippet.to_lowercase();
    let host = host_of(link);

    let mut raw = 0u32;
    let mut reasons = Vec::with_capacity(5);
    let mut hit = |ok: bool, points: u32, id: &'static str| {
        if ok {
            raw += points;
            reasons.push(id);
        }
    };

    // An empty term is never "contained": it would otherwise match everything.
    hit(
        !term.is_empty() && title.contains(&term),
        WEIGHT_TERM_IN_TITLE,
        "term_in_title",
    );
    hit(
        !term.is_empty() && snippet.contains(&term),
        WEIGHT_TERM_IN_SNIPPET,
        "term_in_snippet",
    );
    hit(
        domains.is_trusted(&host),
        WEIGHT_TRUSTED_DOMAIN,
        "trusted_domain",
    );
    hit(
        !link.contains('?') && !link.contains('&'),
        WEIGHT_CLEAN_URL,
        "clean_url",
    );
    hit(
        title.split_whitespace().count() > 3,
        WEIGHT_DESCRIPTIVE_TITLE,
        "descriptive_title",
    );

    let rel = Relevance {
        score: normalize(raw),
        raw,
        reasons,
    };

    if dev_logging_enabled() {
        info!(
            target: "relevance",
            id = %anon_hash(link),
            raw = rel.raw,
            score = rel.score,
            reasons = ?rel.reasons,
            "scored"
        );
    }
    rel
}

/// Normalized pre-extraction score only.
pub fn score(term: &str, title: &str, snippet: &str, link: &str, domains: &DomainSets) -> f64 {
    evaluate(term, title, snippet, link, domains).score
}

/// `raw / 80` rounded to 2 decimals, ties to even.
///
/// `raw` is a multiple of 5, so `raw / 80` is exact in binary and a tie is a
/// true tie (10/80 = 0.125 → 0.12, 70/80 = 0.875 → 0.88).
pub fn normalize(raw: u32) -> f64 {
    let hundredths = f64::from(raw) * 100.0 / f64::from(BASE_POINTS);
    hundredths.round_ties_even() / 100.0
}

/// Whether an article published at `publish_date` earns the recency boost.
pub fn is_recent(publish_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    publish_date > now - Duration::days(RECENCY_WINDOW_DAYS)
}

/// Post-extraction score: `((score * 80) + 20) / 100` when the article has a
/// recent publish date, `score` unchanged otherwise. Not re-rounded.
pub fn apply_recency_boost(
    score: f64,
    publish_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    match publish_date {
        Some(ts) if is_recent(ts, now) => {
            ((score * f64::from(BASE_POINTS)) + f64::from(RECENCY_BOOST_POINTS)) / 100.0
        }
        _ => score,
    }
}

/// Threshold is inclusive: `score >= threshold` passes.
pub fn passes(score: f64, threshold: f64) -> bool {
    score >= threshold
}
