use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Price of one point in the gateway's currency.
///
/// The only place the rate is defined: both the outbound amount and the
/// callback's inverse conversion go through [`amount_for_quota`] and
/// [`quota_for_amount`].
pub const UNIT_PRICE: Decimal = dec!(0.1);

/// Upper bound on points bought in a single order.
pub const MAX_QUOTA_PER_ORDER: i64 = 1_000_000;

/// Random bytes appended to the timestamp prefix of an order id.
const ORDER_ID_RANDOM_BYTES: usize = 9;

/// Gateway-facing order reference.
///
/// 14 digits of UTC timestamp followed by 18 hex characters drawn from the
/// OS random source; 32 characters in total, the gateway's limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "20240611093015a1b2c3d4e5f6a7b8c9d0")]
pub struct OrderId(String);

impl OrderId {
    pub fn generate() -> Self {
        let mut random = [0u8; ORDER_ID_RANDOM_BYTES];
        OsRng.fill_bytes(&mut random);
        OrderId(format!(
            "{}{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            hex::encode(random)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        OrderId(value)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        OrderId(value.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single point purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub order_id: OrderId,
    pub username: String,
    /// Points requested
    pub quota: i64,
    /// Price charged, two decimal places
    #[schema(value_type = String, example = "5.00")]
    pub amount: Decimal,
    pub status: OrderStatus,
    /// Gateway transaction reference, recorded once paid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh pending order with a newly generated id.
    pub fn new_pending(username: impl Into<String>, quota: i64) -> Self {
        let now = Utc::now();
        Self {
            order_id: OrderId::generate(),
            username: username.into(),
            quota,
            amount: amount_for_quota(quota),
            status: OrderStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `quota × UNIT_PRICE`, fixed at two decimal places.
pub fn amount_for_quota(quota: i64) -> Decimal {
    let mut amount = (Decimal::from(quota) * UNIT_PRICE)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(2);
    amount
}

/// Renders an amount the way the gateway expects it: `"5.00"`.
pub fn format_amount(amount: Decimal) -> String {
    let mut amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    amount.rescale(2);
    amount.to_string()
}

/// `round(amount / UNIT_PRICE)`; `None` when the result does not fit.
pub fn quota_for_amount(amount: Decimal) -> Option<i64> {
    amount
        .checked_div(UNIT_PRICE)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}
