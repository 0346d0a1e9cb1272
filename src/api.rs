// src/api.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::context::AppContext;
use crate::metrics::Metrics;
use crate::model::RunLog;

pub const SERVICE_BANNER: &str = "Relevance scraper is up";

/// HTTP-boundary failures; rendered as `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Store connection is not available.")]
    StoreUnavailable,
    #[error("Run {0} not found.")]
    RunNotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RunNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Build the public router. `/metrics` is merged in when `METRICS_ROUTES=1`.
pub fn router(ctx: AppContext) -> Router {
    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/scrape", post(trigger_run))
        .route("/runs/{run_id}", get(run_status))
        .with_state(ctx);

    if metrics_routes_enabled() {
        if let Some(m) = Metrics::init() {
            app = app.merge(m.router());
        }
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

fn metrics_routes_enabled() -> bool {
    std::env::var("METRICS_ROUTES").ok().as_deref() == Some("1")
}

fn health_word(connected: bool) -> &'static str {
    if connected {
        "healthy"
    } else {
        "unhealthy"
    }
}

async fn root(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "message": SERVICE_BANNER,
        "status": health_word(ctx.store_connected()),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResp {
    pub status: &'static str,
    pub store_connected: bool,
    pub timestamp: String,
}

async fn health(State(ctx): State<AppContext>) -> Json<HealthResp> {
    let connected = ctx.store_connected();
    Json(HealthResp {
        status: health_word(connected),
        store_connected: connected,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[derive(Debug, Serialize)]
pub struct TriggerResp {
    pub message: &'static str,
    pub run_id: String,
}

/// Create the run log synchronously, then hand the run to the runtime.
async fn trigger_run(
    State(ctx): State<AppContext>,
) -> Result<(StatusCode, Json<TriggerResp>), ApiError> {
    let job = ctx.job().ok_or(ApiError::StoreUnavailable)?;

    let run_id = job.create_run_log().await.map_err(|e| {
        error!(target: "api", error = %e, "could not create run log");
        ApiError::Internal(format!("Could not create run log: {e}"))
    })?;

    info!(target: "api", run_id = %run_id, "scrape run accepted");
    // Detached: the outcome is recorded in the run log.
    drop(job.spawn(run_id.clone()));

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResp {
            message: "Scraping run started.",
            run_id,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RunView {
    pub id: String,
    #[serde(flatten)]
    pub log: RunLog,
}

async fn run_status(
    State(ctx): State<AppContext>,
    Path(run_id): Path<String>,
) -> Result<Json<RunView>, ApiError> {
    let store = ctx.store.as_ref().ok_or(ApiError::StoreUnavailable)?;
    let fields = store
        .get(&ctx.config.log_collection, &run_id)
        .await
        .map_err(|e| ApiError::Internal(format!("Could not read run log: {e}")))?
        .ok_or_else(|| ApiError::RunNotFound(run_id.clone()))?;
    let log = RunLog::from_fields(&fields)
        .ok_or_else(|| ApiError::Internal(format!("Run log {run_id} is malformed.")))?;
    Ok(Json(RunView { id: run_id, log }))
}
