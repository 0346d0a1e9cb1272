// src/store/retry.rs
//! Bounded retry with exponential backoff around store calls.
//!
//! Attempt `n` (1-based) that fails with a retryable error sleeps
//! `base_delay * 2^(n-1)` before the next attempt; the last failure is
//! returned unchanged once `max_attempts` is exhausted. Non-retryable errors
//! are returned immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::warn;

use super::{DocumentStore, DocumentStream, Fields, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Run `op` under `policy`. `op_name` labels logs and the retry counter.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                let delay = policy.backoff(attempt);
                warn!(
                    target: "store",
                    op = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "store call failed, retrying"
                );
                counter!("store_retries_total", "op" => op_name).increment(1);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A [`DocumentStore`] handle whose every call goes through [`with_retry`].
#[derive(Clone)]
pub struct ResilientStore {
    inner: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    /// Open a status-filtered query. Only opening the stream is retried;
    /// errors surfacing mid-stream are the caller's to handle.
    pub async fn query_in(
        &self,
        collection: &str,
        field: &str,
        values: &[&str],
        limit: usize,
    ) -> StoreResult<DocumentStream> {
        let inner = self.inner.as_ref();
        with_retry(self.policy, "query", move || {
            inner.query_in(collection, field, values, limit)
        })
        .await
    }

    pub async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let inner = self.inner.as_ref();
        with_retry(self.policy, "update", move || {
            inner.update(collection, id, fields.clone())
        })
        .await
    }

    pub async fn create(&self, collection: &str, fields: Fields) -> StoreResult<String> {
        let inner = self.inner.as_ref();
        with_retry(self.policy, "create", move || {
            inner.create(collection, fields.clone())
        })
        .await
    }

    pub async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>> {
        let inner = self.inner.as_ref();
        with_retry(self.policy, "get", move || inner.get(collection, id)).await
    }
}
