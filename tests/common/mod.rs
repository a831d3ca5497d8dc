#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use quota_pay::{
    auth::JwtIdentityResolver,
    config::PaymentConfig,
    models::{CallbackPayload, OrderId},
    services::{
        HttpGatewayClient, InMemoryOrderStore, InMemoryQuotaLedger, PaymentService, Signer,
    },
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use wiremock::MockServer;

pub const APP_ID: &str = "201906120001";
pub const APP_SECRET: &str = "test-gateway-secret";
pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const PAY_PATH: &str = "/payment/do.html";
pub const QUERY_PATH: &str = "/payment/query.html";

/// Full application wired to in-memory stores and a mock gateway.
pub struct TestApp {
    router: Router,
    pub gateway: MockServer,
    pub orders: InMemoryOrderStore,
    pub ledger: InMemoryQuotaLedger,
    identity: JwtIdentityResolver,
}

impl TestApp {
    pub async fn new() -> Self {
        let gateway = MockServer::start().await;
        let config = PaymentConfig {
            app_id: APP_ID.to_string(),
            app_secret: APP_SECRET.to_string(),
            pay_url: format!("{}{}", gateway.uri(), PAY_PATH),
            query_url: format!("{}{}", gateway.uri(), QUERY_PATH),
            notify_url: "https://chat.example.com/api/v1/payments/xunhupay/notify".to_string(),
            return_url: "https://chat.example.com/buy".to_string(),
            wap_name: "Chat".to_string(),
        };
        Self::with_config(gateway, config)
    }

    pub fn with_config(gateway: MockServer, config: PaymentConfig) -> Self {
        let orders = InMemoryOrderStore::new();
        let ledger = InMemoryQuotaLedger::new();
        let client = HttpGatewayClient::new(Duration::from_secs(5))
            .expect("gateway client for tests");
        let payments = Arc::new(PaymentService::new(
            Arc::new(config),
            Arc::new(orders.clone()),
            Arc::new(ledger.clone()),
            Arc::new(client),
        ));
        let identity = JwtIdentityResolver::new(JWT_SECRET);
        let state = AppState::new(payments, Arc::new(identity.clone()));
        let router = quota_pay::app_router(state, CorsLayer::permissive(), Duration::from_secs(30));

        Self {
            router,
            gateway,
            orders,
            ledger,
            identity,
        }
    }

    /// Bearer token for `username`, valid for an hour.
    pub fn token_for(&self, username: &str) -> String {
        self.identity
            .issue_token(username, chrono::Duration::hours(1))
            .expect("issue test token")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// JSON request as `username` (or anonymous when `None`).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        username: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = username {
            builder = builder.header("authorization", format!("Bearer {}", self.token_for(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    /// Posts a form-encoded notification, as the gateway does.
    pub async fn notify(&self, payload: &CallbackPayload) -> Response {
        self.send(notify_request(payload)).await
    }
}

/// Form-encoded notification request for `payload`.
pub fn notify_request(payload: &CallbackPayload) -> Request<Body> {
    let mut pairs: Vec<(&str, &str)> = payload.signed_fields();
    pairs.push(("hash", payload.hash.as_str()));
    let encoded = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/xunhupay/notify")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(encoded))
        .expect("build notify request")
}

/// A correctly signed notification for `order_id`.
pub fn signed_callback(order_id: &OrderId, total_fee: &str, status: &str) -> CallbackPayload {
    let mut payload = CallbackPayload {
        appid: APP_ID.to_string(),
        trade_order_id: order_id.to_string(),
        out_trade_order: "20240611000012345".to_string(),
        status: status.to_string(),
        pay_type: "wechat".to_string(),
        total_fee: total_fee.to_string(),
        transaction_id: "4200002024061112345".to_string(),
        openid: "oAbc123".to_string(),
        mch_id: "1600000001".to_string(),
        is_subscribe: "N".to_string(),
        time: "1718069415".to_string(),
        nonce_str: "k2d9f8a7s6d5f4g3".to_string(),
        hash: String::new(),
    };
    payload.hash = Signer::new(APP_SECRET).sign(payload.signed_fields());
    payload
}

pub async fn response_text(response: Response) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 response")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
