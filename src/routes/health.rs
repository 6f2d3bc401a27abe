use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::db::HealthCheckResult;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    uptime: u64,
    timestamp: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Response {
    let check = state.db_proxy().check_health().await;
    let (ok, latency_ms) = match &check {
        HealthCheckResult::Healthy { latency } => (true, Some(latency.as_millis() as u64)),
        HealthCheckResult::Unhealthy { reason } => {
            tracing::warn!(%reason, "database health check failed");
            (false, None)
        }
    };

    let response = HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        database: if ok { "connected" } else { "disconnected" },
        latency_ms,
        uptime: state.uptime_seconds(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}
