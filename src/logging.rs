// src/logging.rs
//! Log filter shared by the binary and the tests.

use tracing_subscriber::EnvFilter;

/// Run events are emitted under short targets (`scrape`, `store`, `api`,
/// `relevance`) rather than the crate path, so each one is listed.
pub const DEFAULT_LOG_FILTER: &str =
    "relevance_scraper=info,scrape=info,store=info,api=info,relevance=info,warn";

/// `RUST_LOG` when set and valid, otherwise [`DEFAULT_LOG_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
