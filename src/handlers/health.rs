use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    order_store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    uptime_secs: u64,
    response_time_ms: u128,
}

/// Liveness probe: 200 whenever the process is serving
async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness probe: checks that the order store answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let store = state.payments.check_store().await;

    let (status_code, status, order_store, error) = match store {
        Ok(()) => (StatusCode::OK, "ready", "up", None),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "not_ready",
            "down",
            Some(e.response_message()),
        ),
    };

    (
        status_code,
        Json(ReadinessResponse {
            status,
            order_store,
            error,
            uptime_secs: get_uptime_secs(),
            response_time_ms: start.elapsed().as_millis(),
        }),
    )
}

/// Endpoints:
/// - GET /health       - liveness
/// - GET /health/ready - readiness (order store reachable)
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness_check))
        .route("/ready", get(readiness_check))
}
