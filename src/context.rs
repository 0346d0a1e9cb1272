// src/context.rs
//! Process-wide collaborators, built once at startup and handed to the HTTP
//! layer by reference. Never re-created mid-process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::{ServiceConfig, StoreBackend};
use crate::domains::DomainSets;
use crate::extract::{ArticleExtractor, HtmlArticleExtractor};
use crate::job::{JobSettings, ScrapeJob};
use crate::store::firestore::{FirestoreConfig, FirestoreStore};
use crate::store::memory::InMemoryStore;
use crate::store::retry::{with_retry, ResilientStore};
use crate::store::DocumentStore;

/// Per-request HTTP timeout of the article fetcher. The job-level extraction
/// timeout (if any) wraps the whole extraction on top of this.
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServiceConfig>,
    /// `None` when the store could not be reached at startup.
    pub store: Option<ResilientStore>,
    pub extractor: Arc<dyn ArticleExtractor>,
    pub domains: Arc<DomainSets>,
}

impl AppContext {
    /// Assemble a context from already-built parts (tests, embedding).
    pub fn new(
        config: ServiceConfig,
        store: Option<Arc<dyn DocumentStore>>,
        extractor: Arc<dyn ArticleExtractor>,
        domains: DomainSets,
    ) -> Self {
        let policy = config.retry_policy();
        Self {
            config: Arc::new(config),
            store: store.map(|s| ResilientStore::new(s, policy)),
            extractor,
            domains: Arc::new(domains),
        }
    }

    /// Startup path: config and domain sets must load; the store may fail,
    /// which leaves the service up but unable to start runs.
    pub async fn from_env() -> Result<Self> {
        let config = ServiceConfig::load().context("loading service config")?;
        let domains = DomainSets::load_default().context("loading domain sets")?;
        let extractor: Arc<dyn ArticleExtractor> =
            Arc::new(HtmlArticleExtractor::new(FETCH_TIMEOUT)?);

        let store = match connect_store(&config).await {
            Ok(s) => {
                info!(backend = s.backend_name(), "store connected");
                Some(s)
            }
            Err(e) => {
                error!(error = %e, "store unavailable; runs cannot be started");
                None
            }
        };

        info!(
            trusted = domains.trusted_len(),
            social = domains.social_len(),
            threshold = config.relevance_threshold,
            extractor = extractor.name(),
            "context ready"
        );
        Ok(Self::new(config, store, extractor, domains))
    }

    pub fn store_connected(&self) -> bool {
        self.store.is_some()
    }

    /// A job bound to this context, or `None` without a store.
    pub fn job(&self) -> Option<ScrapeJob> {
        let store = self.store.clone()?;
        Some(ScrapeJob::new(
            store,
            self.extractor.clone(),
            self.domains.clone(),
            JobSettings::from(self.config.as_ref()),
        ))
    }
}

/// Build the configured backend and verify it answers.
pub async fn connect_store(config: &ServiceConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Firestore => {
            let cfg = FirestoreConfig::from_env()?;
            Arc::new(FirestoreStore::new(cfg)?)
        }
    };
    let target = store.as_ref();
    with_retry(config.retry_policy(), "ping", move || target.ping())
        .await
        .with_context(|| format!("{} store did not answer", store.backend_name()))?;
    Ok(store)
}
