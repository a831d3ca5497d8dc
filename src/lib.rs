//! quota-pay library
//!
//! Point purchases for a chat application through a hosted payment gateway:
//! signed pay requests, verified callbacks, idempotent quota crediting.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::FromRef, http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::auth::IdentityResolver;
use crate::services::PaymentService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(payments: Arc<PaymentService>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { payments, identity }
    }
}

impl FromRef<AppState> for Arc<dyn IdentityResolver> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

/// Routes served under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new().nest("/payments", handlers::payments::payments_routes())
}

/// CORS from a comma-separated origin list; permissive when none is usable.
pub fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// The full HTTP application: health, metrics, API docs and `/api/v1`,
/// wrapped in tracing, CORS, timeout and request-id layers.
///
/// The gateway notification route is added after the timeout layer: its
/// reply must always be the `SUCCESS`/`FAIL` token, never a bare 408.
pub fn app_router(state: AppState, cors: CorsLayer, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/health", handlers::health::health_routes())
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(TimeoutLayer::new(request_timeout))
        .merge(handlers::payments::notify_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Outermost so every response, errors included, carries a request id
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
