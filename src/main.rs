//! Relevance Scraper: binary entrypoint.
//! Boots the Axum HTTP server over the shared application context.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*};

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines;
/// `RUST_LOG` overrides the default filter. A subscriber already installed by
/// the host runtime is left in place.
fn init_tracing() {
    let filter = relevance_scraper::logging::env_filter();

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let router = relevance_scraper::app()
        .await
        .map_err(shuttle_runtime::Error::Custom)?;

    Ok(router.into())
}
