use crate::errors::ServiceError;
use crate::models::{Order, OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;

/// Outcome of a compare-and-swap on an order's status.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// This call moved the order out of Pending; carries the updated order.
    Applied(Order),
    /// The order had already been paid; nothing changed.
    AlreadyPaid,
    /// The order had already failed; nothing changed.
    AlreadyFailed,
}

impl StatusChange {
    pub(crate) fn unchanged(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::Pending => None,
            OrderStatus::Paid => Some(StatusChange::AlreadyPaid),
            OrderStatus::Failed => Some(StatusChange::AlreadyFailed),
        }
    }
}

/// Persistence for orders keyed by order id.
///
/// `mark_paid` and `mark_failed` are atomic compare-and-swaps from
/// `Pending`: of any number of concurrent calls for one order, exactly one
/// returns [`StatusChange::Applied`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: Order) -> Result<OrderId, ServiceError>;
    async fn get(&self, order_id: &OrderId) -> Result<Order, ServiceError>;
    async fn mark_paid(
        &self,
        order_id: &OrderId,
        transaction_id: Option<String>,
    ) -> Result<StatusChange, ServiceError>;
    async fn mark_failed(&self, order_id: &OrderId) -> Result<StatusChange, ServiceError>;
    /// A user's orders, newest first.
    async fn list_for_user(&self, username: &str) -> Result<Vec<Order>, ServiceError>;

    /// Reachability check used by the readiness probe.
    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

pub(crate) fn order_not_found(order_id: &OrderId) -> ServiceError {
    ServiceError::NotFound(format!("order {} not found", order_id))
}

/// Thread-safe in-memory order store.
///
/// The status swap runs while holding the map shard's write lock, so it
/// cannot interleave with another swap on the same key.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<DashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
        transaction_id: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| order_not_found(order_id))?;

        if let Some(unchanged) = StatusChange::unchanged(entry.status) {
            return Ok(unchanged);
        }

        entry.status = target;
        entry.updated_at = Utc::now();
        if transaction_id.is_some() {
            entry.transaction_id = transaction_id;
        }
        Ok(StatusChange::Applied(entry.clone()))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<OrderId, ServiceError> {
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "order {} already exists",
                order.order_id
            ))),
            Entry::Vacant(slot) => {
                let id = order.order_id.clone();
                slot.insert(order);
                Ok(id)
            }
        }
    }

    async fn get(&self, order_id: &OrderId) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)
            .map(|order| order.clone())
            .ok_or_else(|| order_not_found(order_id))
    }

    async fn mark_paid(
        &self,
        order_id: &OrderId,
        transaction_id: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        self.transition(order_id, OrderStatus::Paid, transaction_id)
    }

    async fn mark_failed(&self, order_id: &OrderId) -> Result<StatusChange, ServiceError> {
        self.transition(order_id, OrderStatus::Failed, None)
    }

    async fn list_for_user(&self, username: &str) -> Result<Vec<Order>, ServiceError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.username == username)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
