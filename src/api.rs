use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::engine::{FanOutEngine, RunReport};
use crate::error::RunError;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<FanOutEngine>,
}

impl AppState {
    pub fn new(engine: Arc<FanOutEngine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/run", post(run_now))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunOk {
    status: &'static str,
    #[serde(flatten)]
    report: RunReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunFailed {
    status: &'static str,
    stage: &'static str,
    message: String,
    /// Present when dispatches already happened before the failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<RunReport>,
}

impl From<RunError> for RunFailed {
    fn from(e: RunError) -> Self {
        RunFailed {
            status: "error",
            stage: e.stage(),
            message: e.to_string(),
            report: e.report().cloned(),
        }
    }
}

/// POST /run: execute one fan-out and map the outcome to an HTTP status.
async fn run_now(
    State(state): State<AppState>,
) -> Result<Json<RunOk>, (StatusCode, Json<RunFailed>)> {
    match state.engine.run().await {
        Ok(report) => Ok(Json(RunOk {
            status: "ok",
            report,
        })),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, Json(RunFailed::from(e)))),
    }
}
