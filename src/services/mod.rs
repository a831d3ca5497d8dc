pub mod gateway_client;
pub mod order_store;
pub mod payments;
pub mod quota_ledger;
pub mod redis_order_store;
pub mod signer;

pub use gateway_client::{GatewayClient, HttpGatewayClient};
pub use order_store::{InMemoryOrderStore, OrderStore, StatusChange};
pub use payments::{Ack, PayResponse, PaymentService, PaymentUrl};
pub use quota_ledger::{InMemoryQuotaLedger, QuotaLedger};
pub use redis_order_store::RedisOrderStore;
pub use signer::{SignedParams, Signer};
