use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use tracing::info;
use uuid::Uuid;
use voyage_core::idempotency::{IdempotencyStore, Reservation};
use voyage_core::StoreError;

const PENDING: &str = "pending";

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

fn idempotency_key(key: &str) -> String {
    format!("idem:{}", key)
}

/// Decode a stored idempotency value into a reservation state.
fn parse_entry(value: &str) -> Reservation {
    match value.strip_prefix("done:").and_then(|id| Uuid::parse_str(id).ok()) {
        Some(booking_id) => Reservation::Completed(booking_id),
        None => Reservation::InFlight,
    }
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// `SET NX EX`: true when this caller claimed the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_seconds: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn reserve(&self, key: &str, ttl_seconds: u64) -> Result<Reservation, StoreError> {
        let redis_key = idempotency_key(key);

        if self.set_if_absent(&redis_key, PENDING, ttl_seconds.max(1)).await? {
            return Ok(Reservation::Acquired);
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let existing: Option<String> = conn.get(&redis_key).await?;

        match existing {
            Some(value) => Ok(parse_entry(&value)),
            // Expired between SET and GET; one more attempt decides it.
            None => {
                if self.set_if_absent(&redis_key, PENDING, ttl_seconds.max(1)).await? {
                    Ok(Reservation::Acquired)
                } else {
                    Ok(Reservation::InFlight)
                }
            }
        }
    }

    async fn complete(&self, key: &str, booking_id: Uuid, ttl_seconds: u64) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(idempotency_key(key), format!("done:{}", booking_id), ttl_seconds.max(1))
            .await?;
        info!("Idempotency key settled for booking {}", booking_id);
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(idempotency_key(key)).await?;
        Ok(())
    }
}
