use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "quota-pay API",
        version = "1.0.0",
        description = r#"
# Point purchases

Callers buy chat points through a hosted payment page:

1. `POST /api/v1/payments/xunhupay` with `{"quota": 50}` creates an order and
   returns the payment page URL.
2. The gateway notifies `POST /api/v1/payments/xunhupay/notify` once the payer
   has paid; verified notifications credit the points exactly once.
3. Callers can look at their orders, ask the gateway for its view of one, or
   reconcile an order the gateway has closed.

## Authentication

Caller endpoints expect a bearer token whose `sub` is the username:

```
Authorization: Bearer <jwt>
```

The notification endpoint is authenticated by the gateway's signature instead.

## Errors

```json
{ "status": false, "message": "Validation error: ...", "request_id": "..." }
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Payments", description = "Point purchase endpoints")
    ),
    paths(
        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::payment_notify,
        crate::handlers::payments::query_payment,
        crate::handlers::payments::list_orders,
        crate::handlers::payments::get_order,
        crate::handlers::payments::reconcile_order,
    ),
    components(
        schemas(
            crate::handlers::payments::InitiatePaymentRequest,
            crate::handlers::payments::InitiatePaymentResponse,
            crate::models::Order,
            crate::models::OrderId,
            crate::models::OrderStatus,
            crate::models::CallbackPayload,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// `GET /api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
