// src/store/mod.rs
//! Document store abstraction.
//!
//! The pipeline only needs four things from a store: a status-filtered,
//! limited read of one collection, a partial update of one document, document
//! creation with a generated id, and a single-document read. Backends:
//! - [`memory::InMemoryStore`] for local runs and tests,
//! - [`firestore::FirestoreStore`] over the Firestore REST API.
//!
//! [`retry::ResilientStore`] wraps any backend with bounded exponential backoff.

pub mod firestore;
pub mod memory;
pub mod retry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// A typed field value, the intersection of what Firestore stores and what
/// this service writes.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::Array(v.into_iter().map(FieldValue::String).collect())
    }
}

/// Field map of a single document. Ordered so writes and logs are stable.
pub type Fields = BTreeMap<String, FieldValue>;

/// One document as returned by a query: opaque id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Lazily produced, finite, non-restartable query result.
pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("store response could not be decoded: {0}")]
    Decode(String),
    #[error("store misconfigured: {0}")]
    Config(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::Unavailable(_) => true,
            StoreError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..=599).contains(status)
            }
            StoreError::NotFound { .. } | StoreError::Decode(_) | StoreError::Config(_) => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow store contract consumed by the pipeline.
///
/// Updates are last-writer-wins per field; no backend offers multi-document
/// transactions or optimistic concurrency here.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents of `collection` whose `field` equals any of `values`, at most `limit`.
    async fn query_in(
        &self,
        collection: &str,
        field: &str,
        values: &[&str],
        limit: usize,
    ) -> StoreResult<DocumentStream>;

    /// Partial update: only the given fields are written, others are kept.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;

    /// Create a document and return its generated id.
    async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>>;

    /// Connectivity check used once at startup.
    async fn ping(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}
