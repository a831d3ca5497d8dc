use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::models::{CallbackPayload, Order, OrderId, MAX_QUOTA_PER_ORDER};
use crate::services::Ack;
use crate::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        Form, Json, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({ "quota": 50 }))]
pub struct InitiatePaymentRequest {
    /// Points to buy
    #[validate(range(min = 1, max = 1000000))]
    pub quota: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": true,
    "url": "https://api.xunhupay.com/payments/wechat/index?id=20240611",
    "order_id": "20240611093015a1b2c3d4e5f6a7b8c9d0"
}))]
pub struct InitiatePaymentResponse {
    pub status: bool,
    /// Payment page to redirect the payer to
    pub url: String,
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QueryOrderParams {
    /// Order to look up at the gateway
    #[serde(default)]
    pub order_id: String,
}

impl IntoResponse for Ack {
    fn into_response(self) -> Response {
        let status = match self {
            Ack::Success => StatusCode::OK,
            Ack::Fail => StatusCode::BAD_REQUEST,
        };
        (status, self.as_str()).into_response()
    }
}

/// Start a point purchase
#[utoipa::path(
    post,
    path = "/api/v1/payments/xunhupay",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Payment page issued", body = InitiatePaymentResponse),
        (status = 400, description = "Invalid quota", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Gateway or configuration failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<InitiatePaymentResponse>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        ServiceError::ValidationError(format!(
            "quota must be a positive integer up to {} ({})",
            MAX_QUOTA_PER_ORDER,
            rejection.body_text()
        ))
    })?;
    request.validate()?;

    let issued = state
        .payments
        .initiate_payment(&user.username, request.quota)
        .await?;

    Ok(Json(InitiatePaymentResponse {
        status: true,
        url: issued.url,
        order_id: issued.order_id,
    }))
}

/// Gateway payment notification
#[utoipa::path(
    post,
    path = "/api/v1/payments/xunhupay/notify",
    request_body(content = CallbackPayload, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Accepted", body = String, example = json!("SUCCESS")),
        (status = 400, description = "Rejected; the gateway will retry", body = String, example = json!("FAIL"))
    ),
    tag = "Payments"
)]
pub async fn payment_notify(
    State(state): State<AppState>,
    payload: Result<Form<CallbackPayload>, FormRejection>,
) -> Ack {
    match payload {
        Ok(Form(payload)) => state.payments.handle_callback(payload).await,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "unreadable payment notification");
            Ack::Fail
        }
    }
}

/// Gateway view of one of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/payments/xunhupay/query",
    params(QueryOrderParams),
    responses(
        (status = 200, description = "Gateway response, unmodified", body = serde_json::Value),
        (status = 400, description = "Missing order id", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn query_payment(
    State(state): State<AppState>,
    user: AuthUser,
    params: Result<Query<QueryOrderParams>, QueryRejection>,
) -> Result<Json<Value>, ServiceError> {
    let Query(params) =
        params.map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))?;
    let order_id = params.order_id.trim();
    if order_id.is_empty() {
        return Err(ServiceError::ValidationError(
            "order_id is required".to_string(),
        ));
    }

    let order_id = OrderId::from(order_id);
    state.payments.get_order(&user.username, &order_id).await?;
    let report = state.payments.query_order(&order_id).await?;
    Ok(Json(report))
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/payments/orders",
    responses(
        (status = 200, description = "Orders", body = Vec<Order>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Order>>, ServiceError> {
    Ok(Json(state.payments.list_orders(&user.username).await?))
}

/// One of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/payments/orders/{order_id}",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = Order),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ServiceError> {
    let order = state
        .payments
        .get_order(&user.username, &OrderId::from(order_id))
        .await?;
    Ok(Json(order))
}

/// Re-check an order with the gateway and fail it if the gateway closed it
#[utoipa::path(
    post,
    path = "/api/v1/payments/orders/{order_id}/reconcile",
    params(("order_id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order after reconciliation", body = Order),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such order", body = crate::errors::ErrorResponse),
        (status = 500, description = "Gateway failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn reconcile_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ServiceError> {
    let order_id = OrderId::from(order_id);
    state.payments.get_order(&user.username, &order_id).await?;
    Ok(Json(state.payments.reconcile_order(&order_id).await?))
}

/// Full path of the gateway notification endpoint.
pub const NOTIFY_PATH: &str = "/api/v1/payments/xunhupay/notify";

/// Caller-facing payment routes, nested under `/api/v1/payments`.
///
/// The notification endpoint is mounted separately with [`notify_routes`]
/// so it stays outside the request timeout.
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/xunhupay", post(initiate_payment))
        .route("/xunhupay/query", get(query_payment))
        .route("/orders", get(list_orders))
        .route("/orders/:order_id", get(get_order))
        .route("/orders/:order_id/reconcile", post(reconcile_order))
}

/// The gateway notification route at [`NOTIFY_PATH`].
pub fn notify_routes() -> Router<AppState> {
    Router::new().route(NOTIFY_PATH, post(payment_notify))
}
