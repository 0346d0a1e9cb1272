use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Process-wide Prometheus recorder. Installing twice is an error in the
/// metrics crate, so the handle is created at most once.
static HANDLE: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once) and describe the pipeline series.
    /// `None` if another recorder was already installed.
    pub fn init() -> Option<Self> {
        let handle = HANDLE
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(h) => {
                    describe_pipeline_metrics();
                    Some(h)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "prometheus recorder not installed");
                    None
                }
            })
            .clone()?;
        Some(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_pipeline_metrics() {
    describe_counter!("scrape_runs_total", "Scrape runs started.");
    describe_counter!(
        "scrape_run_failures_total",
        "Scrape runs that ended in the failed state."
    );
    describe_counter!(
        "scrape_records_total",
        "Records taken through the pipeline, by terminal status."
    );
    describe_counter!("store_retries_total", "Store calls retried after a failure.");
    describe_histogram!("scrape_extract_ms", "Article extraction time in milliseconds.");
    describe_gauge!("scrape_last_run_ts", "Unix ts when a scrape run last finished.");
}
