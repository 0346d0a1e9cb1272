// src/model.rs
//! Persisted shapes: URL records, their status literals, and run logs.
//!
//! Field names and status strings are the store's external contract and are
//! written verbatim.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{Document, FieldValue, Fields};

/// Per-record pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Reprocess,
    ScraperOk,
    ScraperFailed,
    ScraperSkipped,
    RelevanceFailed,
}

impl RecordStatus {
    /// Statuses the job selects as candidates.
    pub const CANDIDATES: [RecordStatus; 2] = [RecordStatus::Pending, RecordStatus::Reprocess];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Reprocess => "reprocess",
            RecordStatus::ScraperOk => "scraper_ok",
            RecordStatus::ScraperFailed => "scraper_failed",
            RecordStatus::ScraperSkipped => "scraper_skipped",
            RecordStatus::RelevanceFailed => "relevance_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => RecordStatus::Pending,
            "reprocess" => RecordStatus::Reprocess,
            "scraper_ok" => RecordStatus::ScraperOk,
            "scraper_failed" => RecordStatus::ScraperFailed,
            "scraper_skipped" => RecordStatus::ScraperSkipped,
            "relevance_failed" => RecordStatus::RelevanceFailed,
            _ => return None,
        })
    }

    pub fn is_candidate(&self) -> bool {
        Self::CANDIDATES.contains(self)
    }

    pub fn candidate_literals() -> [&'static str; 2] {
        Self::CANDIDATES.map(|s| s.as_str())
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL candidate as read from the store (pre-extraction view).
///
/// Missing or non-string fields read as empty, so a malformed document still
/// flows through the state machine instead of failing the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub id: String,
    pub term: String,
    pub title: String,
    pub snippet: String,
    /// `None` when the field is absent or blank.
    pub link: Option<String>,
    pub status: Option<RecordStatus>,
}

impl UrlRecord {
    pub fn from_document(doc: &Document) -> Self {
        let text = |name: &str| {
            doc.fields
                .get(name)
                .and_then(FieldValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let link = Some(text("link")).filter(|l| !l.trim().is_empty());
        let status = doc
            .fields
            .get("status")
            .and_then(FieldValue::as_str)
            .and_then(RecordStatus::parse);
        Self {
            id: doc.id.clone(),
            term: text("term"),
            title: text("title"),
            snippet: text("snippet"),
            link,
            status,
        }
    }
}

/// Terminal write for one record. Each variant carries exactly the fields its
/// status makes meaningful.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    MissingLink {
        message: String,
    },
    Skipped {
        reason: String,
    },
    RelevanceFailed {
        score: f64,
    },
    Scraped {
        score: f64,
        content: String,
        title: String,
        authors: Vec<String>,
        publish_date: Option<DateTime<Utc>>,
    },
    ScrapeFailed {
        message: String,
    },
}

impl RecordUpdate {
    pub fn status(&self) -> RecordStatus {
        match self {
            RecordUpdate::MissingLink { .. } | RecordUpdate::ScrapeFailed { .. } => {
                RecordStatus::ScraperFailed
            }
            RecordUpdate::Skipped { .. } => RecordStatus::ScraperSkipped,
            RecordUpdate::RelevanceFailed { .. } => RecordStatus::RelevanceFailed,
            RecordUpdate::Scraped { .. } => RecordStatus::ScraperOk,
        }
    }

    /// Partial-update field map, stamped with `last_processed_at = now`.
    pub fn into_fields(self, now: DateTime<Utc>) -> Fields {
        let mut f = Fields::new();
        f.insert("status".into(), self.status().as_str().into());
        f.insert("last_processed_at".into(), now.into());
        match self {
            RecordUpdate::MissingLink { message } | RecordUpdate::ScrapeFailed { message } => {
                f.insert("error_message".into(), message.into());
            }
            RecordUpdate::Skipped { reason } => {
                f.insert("reason".into(), reason.into());
            }
            RecordUpdate::RelevanceFailed { score } => {
                f.insert("relevance_score".into(), score.into());
            }
            RecordUpdate::Scraped {
                score,
                content,
                title,
                authors,
                publish_date,
            } => {
                f.insert("relevance_score".into(), score.into());
                f.insert("scraped_content".into(), content.into());
                f.insert("scraped_title".into(), title.into());
                f.insert("authors".into(), authors.into());
                f.insert("publish_date".into(), publish_date.into());
            }
        }
        f
    }
}

/// Run log lifecycle: `started → processing → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "started" => RunStatus::Started,
            "processing" => RunStatus::Processing,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// One triggered run, as stored in the log collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunLog {
    pub task: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub processed_count: i64,
    pub failed_count: i64,
    pub message: Option<String>,
    pub error_message: Option<String>,
}

impl RunLog {
    pub fn started(task: &str, now: DateTime<Utc>) -> Self {
        Self {
            task: task.to_string(),
            start_time: now,
            end_time: None,
            status: RunStatus::Started,
            processed_count: 0,
            failed_count: 0,
            message: None,
            error_message: None,
        }
    }

    /// Full field map for creation.
    pub fn to_fields(&self) -> Fields {
        let mut f = Fields::new();
        f.insert("task".into(), self.task.as_str().into());
        f.insert("start_time".into(), self.start_time.into());
        f.insert("end_time".into(), self.end_time.into());
        f.insert("status".into(), self.status.as_str().into());
        f.insert("processed_count".into(), self.processed_count.into());
        f.insert("failed_count".into(), self.failed_count.into());
        f.insert("message".into(), self.message.clone().into());
        f.insert("error_message".into(), self.error_message.clone().into());
        f
    }

    /// Parse a stored log; `None` when required fields are missing.
    pub fn from_fields(f: &Fields) -> Option<Self> {
        let opt_text = |name: &str| f.get(name).and_then(FieldValue::as_str).map(str::to_string);
        Some(Self {
            task: opt_text("task")?,
            start_time: f.get("start_time").and_then(FieldValue::as_timestamp)?,
            end_time: f.get("end_time").and_then(FieldValue::as_timestamp),
            status: f
                .get("status")
                .and_then(FieldValue::as_str)
                .and_then(RunStatus::parse)?,
            processed_count: f
                .get("processed_count")
                .and_then(FieldValue::as_i64)
                .unwrap_or(0),
            failed_count: f
                .get("failed_count")
                .and_then(FieldValue::as_i64)
                .unwrap_or(0),
            message: opt_text("message"),
            error_message: opt_text("error_message"),
        })
    }
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
