//! Prometheus counters for the payment flow, exposed at `/metrics`.

use axum::{http::header, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("quota_pay".to_string()), None)
        .expect("registry can be created");
    static ref PAYMENTS_INITIATED: IntCounter = register(IntCounter::new(
        "payments_initiated_total",
        "Payment URLs handed out to callers"
    )
    .expect("metric can be created"));
    static ref GATEWAY_REJECTIONS: IntCounter = register(IntCounter::new(
        "gateway_rejections_total",
        "Pay requests the gateway declined"
    )
    .expect("metric can be created"));
    static ref CALLBACK_ACKS: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "callback_acks_total",
            "Gateway callbacks answered, by acknowledgement"
        ),
        &["outcome"]
    )
    .expect("metric can be created"));
    static ref QUOTA_CREDITED: IntCounter = register(IntCounter::new(
        "quota_credited_total",
        "Points credited from verified payments"
    )
    .expect("metric can be created"));
    static ref ORDERS_FAILED: IntCounter = register(IntCounter::new(
        "orders_failed_total",
        "Orders moved to failed by reconciliation"
    )
    .expect("metric can be created"));
}

fn register<M>(metric: M) -> M
where
    M: prometheus::core::Collector + Clone + 'static,
{
    if let Err(e) = REGISTRY.register(Box::new(metric.clone())) {
        error!(error = %e, "failed to register metric");
    }
    metric
}

pub fn record_payment_initiated() {
    PAYMENTS_INITIATED.inc();
}

pub fn record_gateway_rejection() {
    GATEWAY_REJECTIONS.inc();
}

pub fn record_callback_ack(outcome: &str) {
    CALLBACK_ACKS.with_label_values(&[outcome]).inc();
}

pub fn record_quota_credited(quota: i64) {
    if let Ok(points) = u64::try_from(quota) {
        QUOTA_CREDITED.inc_by(points);
    }
}

pub fn record_order_failed() {
    ORDERS_FAILED.inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    lazy_static::initialize(&PAYMENTS_INITIATED);
    lazy_static::initialize(&GATEWAY_REJECTIONS);
    lazy_static::initialize(&CALLBACK_ACKS);
    lazy_static::initialize(&QUOTA_CREDITED);
    lazy_static::initialize(&ORDERS_FAILED);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            axum::http::StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                String::new(),
            )
        }
    }
}
