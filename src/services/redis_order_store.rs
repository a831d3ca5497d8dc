use super::order_store::{order_not_found, OrderStore, StatusChange};
use crate::errors::ServiceError;
use crate::models::{Order, OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Script};
use tracing::{debug, instrument};

// KEYS[1] order key; ARGV[1] target status, ARGV[2] updated_at,
// ARGV[3] transaction id or empty.
const TRANSITION_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {'missing'}
end
local order = cjson.decode(raw)
if order.status ~= 'pending' then
  return {order.status}
end
order.status = ARGV[1]
order.updated_at = ARGV[2]
if ARGV[3] ~= '' then
  order.transaction_id = ARGV[3]
end
local encoded = cjson.encode(order)
redis.call('SET', KEYS[1], encoded)
return {'applied', encoded}
"#;

// KEYS[1] order key, KEYS[2] user index; ARGV[1] order JSON, ARGV[2] order
// id, ARGV[3] creation time in milliseconds.
const CREATE_SCRIPT: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
  redis.call('ZADD', KEYS[2], ARGV[3], ARGV[2])
  return 1
end
return 0
"#;

/// Redis-backed order store.
///
/// Orders are JSON documents under `{ns}:order:{id}`; each user has a sorted
/// set `{ns}:user:{username}` of order ids scored by creation time. Status
/// swaps and creation run as Lua scripts, so each is atomic on the server.
#[derive(Clone)]
pub struct RedisOrderStore {
    client: redis::Client,
    namespace: String,
    create: Script,
    transition: Script,
}

impl RedisOrderStore {
    pub fn new(redis_url: &str, namespace: impl Into<String>) -> Result<Self, ServiceError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            namespace: namespace.into(),
            create: Script::new(CREATE_SCRIPT),
            transition: Script::new(TRANSITION_SCRIPT),
        })
    }

    fn order_key(&self, order_id: &OrderId) -> String {
        format!("{}:order:{}", self.namespace, order_id)
    }

    fn user_key(&self, username: &str) -> String {
        format!("{}:user:{}", self.namespace, username)
    }

    async fn swap(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
        transaction_id: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let reply: Vec<String> = self
            .transition
            .key(self.order_key(order_id))
            .arg(target.to_string())
            .arg(Utc::now().to_rfc3339())
            .arg(transaction_id.unwrap_or_default())
            .invoke_async(&mut conn)
            .await?;

        match reply.first().map(String::as_str) {
            Some("applied") => {
                let raw = reply.get(1).ok_or_else(|| {
                    ServiceError::StoreError("transition script returned no order".to_string())
                })?;
                Ok(StatusChange::Applied(serde_json::from_str(raw)?))
            }
            Some("missing") => Err(order_not_found(order_id)),
            Some("paid") => Ok(StatusChange::AlreadyPaid),
            Some("failed") => Ok(StatusChange::AlreadyFailed),
            other => Err(ServiceError::StoreError(format!(
                "unexpected transition reply {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl OrderStore for RedisOrderStore {
    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    async fn create(&self, order: Order) -> Result<OrderId, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let body = serde_json::to_string(&order)?;

        let created: i64 = self
            .create
            .key(self.order_key(&order.order_id))
            .key(self.user_key(&order.username))
            .arg(body)
            .arg(order.order_id.as_str())
            .arg(order.created_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            return Err(ServiceError::Conflict(format!(
                "order {} already exists",
                order.order_id
            )));
        }

        debug!("order persisted");
        Ok(order.order_id)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Order, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let raw: Option<String> = conn.get(self.order_key(order_id)).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(order_not_found(order_id)),
        }
    }

    async fn mark_paid(
        &self,
        order_id: &OrderId,
        transaction_id: Option<String>,
    ) -> Result<StatusChange, ServiceError> {
        self.swap(order_id, OrderStatus::Paid, transaction_id).await
    }

    async fn mark_failed(&self, order_id: &OrderId) -> Result<StatusChange, ServiceError> {
        self.swap(order_id, OrderStatus::Failed, None).await
    }

    async fn list_for_user(&self, username: &str) -> Result<Vec<Order>, ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.user_key(username), 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.order_key(&OrderId::from(id.as_str())))
            .collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        raw.into_iter()
            .flatten()
            .map(|body| serde_json::from_str(&body).map_err(ServiceError::from))
            .collect()
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        let mut conn = self.client.get_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
