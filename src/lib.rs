// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod context;
pub mod domains;
pub mod extract;
pub mod job;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod relevance;
pub mod store;

pub use crate::api::router;
pub use crate::context::AppContext;

use axum::Router;
use tracing::info;

/// Build the full in-process app from the environment: config, domain sets,
/// store connection and extractor, then the router over them.
pub async fn app() -> anyhow::Result<Router> {
    let ctx = AppContext::from_env().await?;
    info!(
        store_connected = ctx.store_connected(),
        batch_size = ctx.config.batch_size,
        max_per_run = ctx.config.max_per_run,
        "relevance scraper ready"
    );
    Ok(router(ctx))
}
