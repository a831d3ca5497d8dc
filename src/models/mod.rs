pub mod callback;
pub mod order;

pub use callback::{CallbackPayload, PAID_STATUS};
pub use order::{
    amount_for_quota, format_amount, quota_for_amount, Order, OrderId, OrderStatus,
    MAX_QUOTA_PER_ORDER, UNIT_PRICE,
};
