use crate::errors::ServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Per-user point balances.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Adds `quota` points to `username`, returning the new balance.
    async fn credit(&self, username: &str, quota: i64) -> Result<i64, ServiceError>;
    async fn balance(&self, username: &str) -> Result<i64, ServiceError>;
}

#[derive(Default, Clone)]
pub struct InMemoryQuotaLedger {
    balances: Arc<DashMap<String, i64>>,
}

impl InMemoryQuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaLedger for InMemoryQuotaLedger {
    async fn credit(&self, username: &str, quota: i64) -> Result<i64, ServiceError> {
        if quota <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "credit must be positive, got {}",
                quota
            )));
        }
        let mut balance = self.balances.entry(username.to_string()).or_insert(0);
        *balance = balance.checked_add(quota).ok_or_else(|| {
            ServiceError::InternalError(format!("balance overflow for {}", username))
        })?;
        Ok(*balance)
    }

    async fn balance(&self, username: &str) -> Result<i64, ServiceError> {
        Ok(self.balances.get(username).map(|b| *b).unwrap_or(0))
    }
}
