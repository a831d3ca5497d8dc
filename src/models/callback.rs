use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status code the gateway reports for a settled payment.
pub const PAID_STATUS: &str = "1";

/// Asynchronous payment notification as posted by the gateway.
///
/// Every field defaults to empty so a partially filled form still reaches
/// signature verification, which then rejects it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CallbackPayload {
    pub appid: String,
    pub trade_order_id: String,
    pub out_trade_order: String,
    pub status: String,
    pub pay_type: String,
    pub total_fee: String,
    pub transaction_id: String,
    pub openid: String,
    pub mch_id: String,
    pub is_subscribe: String,
    pub time: String,
    pub nonce_str: String,
    pub hash: String,
}

impl CallbackPayload {
    /// Every reported field except `hash`, in form order.
    pub fn signed_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("appid", self.appid.as_str()),
            ("trade_order_id", self.trade_order_id.as_str()),
            ("out_trade_order", self.out_trade_order.as_str()),
            ("status", self.status.as_str()),
            ("pay_type", self.pay_type.as_str()),
            ("total_fee", self.total_fee.as_str()),
            ("transaction_id", self.transaction_id.as_str()),
            ("openid", self.openid.as_str()),
            ("mch_id", self.mch_id.as_str()),
            ("is_subscribe", self.is_subscribe.as_str()),
            ("time", self.time.as_str()),
            ("nonce_str", self.nonce_str.as_str()),
        ]
    }

    pub fn is_paid(&self) -> bool {
        self.status == PAID_STATUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_fields_exclude_hash() {
        let payload = CallbackPayload {
            hash: "deadbeef".into(),
            ..Default::default()
        };
        assert!(payload.signed_fields().iter().all(|(k, _)| *k != "hash"));
        assert_eq!(payload.signed_fields().len(), 12);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let payload: CallbackPayload =
            serde_json::from_str(r#"{"trade_order_id":"abc","status":"1"}"#).unwrap();
        assert_eq!(payload.trade_order_id, "abc");
        assert!(payload.is_paid());
        assert!(payload.total_fee.is_empty());
    }
}
