//! HTTP trigger surface.

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Secret;
use crate::pipeline::DigestPipeline;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: DigestPipeline,
    /// Required bearer token for `POST /run-digest`, when set.
    pub trigger_token: Option<Secret>,
}

/// Build the HTTP router for the trigger service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/run-digest", post(run_digest_handler))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "daily-digest",
        "description": "Daily Jira & Confluence digest delivered by email",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /run-digest": "Collect the last window of activity and send the digest",
            "GET /health": "Liveness check"
        }
    }))
}

/// Run the digest pipeline synchronously and report the outcome.
pub async fn run_digest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Some(expected) = &state.trigger_token {
        if !bearer_matches(&headers, expected) {
            warn!("Rejected digest trigger with missing or invalid bearer token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "error", "message": "unauthorized" })),
            );
        }
    }

    info!("Digest run triggered over HTTP");

    match state.pipeline.run(Utc::now()).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Digest sent successfully",
                "report": report,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Digest run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
        }
    }
}

fn bearer_matches(headers: &HeaderMap, expected: &Secret) -> bool {
    let Some(provided) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };

    provided
        .trim()
        .as_bytes()
        .ct_eq(expected.expose().as_bytes())
        .into()
}
