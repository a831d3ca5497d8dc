use crate::config::PaymentConfig;
use crate::errors::ServiceError;
use crate::metrics;
use crate::models::{format_amount, quota_for_amount, CallbackPayload, Order, OrderId};
use crate::services::gateway_client::GatewayClient;
use crate::services::order_store::{OrderStore, StatusChange};
use crate::services::quota_ledger::QuotaLedger;
use crate::services::signer::{SignedParams, Signer};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Instrument};

const PAY_API_VERSION: &str = "1.1";
const NONCE_LEN: usize = 16;
const DEFAULT_REJECTION: &str = "payment request failed";
/// Provider query status for a cancelled or closed order.
const PROVIDER_CANCELLED: &str = "CD";

/// A payment page the caller should be redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUrl {
    pub url: String,
    pub order_id: OrderId,
}

/// Gateway answer to a pay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayResponse {
    Redirect { url: String },
    Rejected { message: String },
}

impl PayResponse {
    /// Interprets the gateway's JSON envelope.
    ///
    /// `status: true` with a non-empty `url` is a redirect; anything else is a
    /// rejection carrying `err_msg` (or `errmsg`). A body that is not JSON is
    /// an error.
    pub fn parse(body: &str) -> Result<Self, ServiceError> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            warn!(error = %e, "gateway pay response is not JSON");
            ServiceError::GatewayRejected("unreadable response from payment gateway".to_string())
        })?;

        let accepted = value.get("status").and_then(Value::as_bool).unwrap_or(false);
        let url = value
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty());

        if let (true, Some(url)) = (accepted, url) {
            return Ok(PayResponse::Redirect {
                url: url.to_string(),
            });
        }

        let message = ["err_msg", "errmsg"]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|msg| !msg.is_empty())
            .unwrap_or(DEFAULT_REJECTION)
            .to_string();
        Ok(PayResponse::Rejected { message })
    }
}

/// Acknowledgement returned to the gateway for a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Success,
    Fail,
}

impl Ack {
    pub fn as_str(self) -> &'static str {
        match self {
            Ack::Success => "SUCCESS",
            Ack::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrates orders, gateway calls and quota crediting.
pub struct PaymentService {
    config: Arc<PaymentConfig>,
    signer: Signer,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn QuotaLedger>,
    gateway: Arc<dyn GatewayClient>,
}

impl PaymentService {
    pub fn new(
        config: Arc<PaymentConfig>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn QuotaLedger>,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        let signer = Signer::new(config.app_secret.clone());
        Self {
            config,
            signer,
            orders,
            ledger,
            gateway,
        }
    }

    /// Creates a pending order and asks the gateway for a payment page.
    #[instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        username: &str,
        quota: i64,
    ) -> Result<PaymentUrl, ServiceError> {
        if quota <= 0 {
            return Err(ServiceError::ValidationError(
                "quota must be a positive integer".to_string(),
            ));
        }
        if quota > crate::models::MAX_QUOTA_PER_ORDER {
            return Err(ServiceError::ValidationError(format!(
                "quota must not exceed {}",
                crate::models::MAX_QUOTA_PER_ORDER
            )));
        }
        self.config.ensure_complete()?;

        let order = Order::new_pending(username, quota);
        let order_id = self.orders.create(order.clone()).await?;
        info!(order_id = %order_id, amount = %order.amount, "order created");

        let params = SignedParams::new()
            .with("version", PAY_API_VERSION)
            .with("trade_order_id", order_id.as_str())
            .with("total_fee", format_amount(order.amount))
            .with("title", format!("Purchase {} points", quota))
            .with("notify_url", self.config.notify_url.as_str())
            .with("return_url", self.config.return_url.as_str())
            .with("wap_name", self.config.wap_name.as_str());

        let body = self.call_gateway(&self.config.pay_url, params).await?;

        match PayResponse::parse(&body)? {
            PayResponse::Redirect { url } => {
                metrics::record_payment_initiated();
                info!(order_id = %order_id, "payment url issued");
                Ok(PaymentUrl { url, order_id })
            }
            PayResponse::Rejected { message } => {
                metrics::record_gateway_rejection();
                warn!(order_id = %order_id, reason = %message, "gateway rejected pay request");
                Err(ServiceError::GatewayRejected(message))
            }
        }
    }

    /// Verifies and applies a payment notification.
    ///
    /// Never returns an error: failures before the order is marked paid are
    /// logged and answered with [`Ack::Fail`] so the gateway retries. Once
    /// the status swap has happened the answer is [`Ack::Success`]; a failed
    /// credit is logged for manual review.
    #[instrument(skip(self, payload), fields(order_id = %payload.trade_order_id))]
    pub async fn handle_callback(&self, payload: CallbackPayload) -> Ack {
        let ack = self.process_callback(payload).await;
        metrics::record_callback_ack(match ack {
            Ack::Success => "success",
            Ack::Fail => "fail",
        });
        ack
    }

    async fn process_callback(&self, payload: CallbackPayload) -> Ack {
        if let Err(err) = self.config.ensure_complete() {
            error!(kind = err.kind(), error = %err, "callback received without payment settings");
            return Ack::Fail;
        }

        if !self.signer.verify(payload.signed_fields(), &payload.hash) {
            let err = ServiceError::SignatureMismatch(payload.trade_order_id.clone());
            warn!(kind = err.kind(), "{}", err);
            return Ack::Fail;
        }

        if payload.appid != self.config.app_id {
            warn!(appid = %payload.appid, "callback for a different app id");
            return Ack::Fail;
        }

        if !payload.is_paid() {
            info!(status = %payload.status, "non-success callback acknowledged");
            return Ack::Success;
        }

        let paid = match Decimal::from_str(payload.total_fee.trim()) {
            Ok(amount) if amount > Decimal::ZERO => amount,
            _ => {
                warn!(total_fee = %payload.total_fee, "callback amount is not a positive decimal");
                return Ack::Fail;
            }
        };
        let quota = match quota_for_amount(paid) {
            Some(quota) if quota > 0 => quota,
            _ => {
                warn!(total_fee = %paid, "callback amount is worth no points");
                return Ack::Fail;
            }
        };

        let order_id = OrderId::from(payload.trade_order_id);
        let order = match self.orders.get(&order_id).await {
            Ok(order) => order,
            Err(err @ ServiceError::NotFound(_)) => {
                warn!(kind = err.kind(), "callback for unknown order");
                return Ack::Fail;
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, "order lookup failed");
                return Ack::Fail;
            }
        };
        if order.quota != quota {
            warn!(
                ordered = order.quota,
                paid = quota,
                "paid amount does not match order; crediting paid amount"
            );
        }

        let transaction_id = Some(payload.transaction_id).filter(|t| !t.is_empty());
        let settle = settle_paid(
            Arc::clone(&self.orders),
            Arc::clone(&self.ledger),
            order_id,
            transaction_id,
            quota,
        );
        // Detached so a dropped connection cannot cut the swap from the credit
        match tokio::spawn(settle.in_current_span()).await {
            Ok(ack) => ack,
            Err(err) => {
                error!(error = %err, "settlement task failed");
                Ack::Fail
            }
        }
    }

    /// Asks the gateway for its view of an order; the JSON is returned as-is.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn query_order(&self, order_id: &OrderId) -> Result<Value, ServiceError> {
        self.config.ensure_complete()?;

        let params = SignedParams::new().with("out_trade_order", order_id.as_str());
        let body = self.call_gateway(&self.config.query_url, params).await?;

        serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "gateway query response is not JSON");
            ServiceError::GatewayRejected("unreadable response from payment gateway".to_string())
        })
    }

    /// Moves a pending order to failed when the gateway reports it closed.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn reconcile_order(&self, order_id: &OrderId) -> Result<Order, ServiceError> {
        let order = self.orders.get(order_id).await?;
        if order.status.is_terminal() {
            debug!(status = %order.status, "order already settled");
            return Ok(order);
        }

        let report = self.query_order(order_id).await?;
        let provider_status = report.pointer("/data/status").and_then(Value::as_str);
        if provider_status != Some(PROVIDER_CANCELLED) {
            debug!(?provider_status, "no terminal failure reported");
            return Ok(order);
        }

        match self.orders.mark_failed(order_id).await? {
            StatusChange::Applied(order) => {
                metrics::record_order_failed();
                info!("order marked failed");
                Ok(order)
            }
            StatusChange::AlreadyPaid | StatusChange::AlreadyFailed => {
                self.orders.get(order_id).await
            }
        }
    }

    /// An order owned by `username`; other users' orders read as missing.
    pub async fn get_order(&self, username: &str, order_id: &OrderId) -> Result<Order, ServiceError> {
        let order = self.orders.get(order_id).await?;
        if order.username != username {
            return Err(crate::services::order_store::order_not_found(order_id));
        }
        Ok(order)
    }

    pub async fn list_orders(&self, username: &str) -> Result<Vec<Order>, ServiceError> {
        self.orders.list_for_user(username).await
    }

    pub async fn check_store(&self) -> Result<(), ServiceError> {
        self.orders.ping().await
    }

    async fn call_gateway(&self, url: &str, params: SignedParams) -> Result<String, ServiceError> {
        let params = params
            .with("appid", self.config.app_id.as_str())
            .with("time", Utc::now().timestamp().to_string())
            .with("nonce_str", nonce());
        let hash = self.signer.sign(params.iter());
        self.gateway.execute(url, &params.into_form(hash)).await
    }
}

async fn settle_paid(
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn QuotaLedger>,
    order_id: OrderId,
    transaction_id: Option<String>,
    quota: i64,
) -> Ack {
    match orders.mark_paid(&order_id, transaction_id).await {
        Ok(StatusChange::Applied(order)) => match ledger.credit(&order.username, quota).await {
            Ok(balance) => {
                metrics::record_quota_credited(quota);
                info!(username = %order.username, quota, balance, "quota credited");
                Ack::Success
            }
            Err(err) => {
                error!(
                    username = %order.username,
                    quota,
                    kind = err.kind(),
                    error = %err,
                    "order paid but credit failed; needs manual review"
                );
                // Order is Paid now; a gateway retry would not credit it either
                Ack::Success
            }
        },
        Ok(StatusChange::AlreadyPaid) => {
            info!("duplicate callback for paid order");
            Ack::Success
        }
        Ok(StatusChange::AlreadyFailed) => {
            warn!(quota, "payment received for failed order; needs manual review");
            Ack::Success
        }
        Err(err) => {
            error!(kind = err.kind(), error = %err, "could not mark order paid");
            Ack::Fail
        }
    }
}

fn nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
