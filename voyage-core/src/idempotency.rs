use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::StoreError;

/// Outcome of trying to claim an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Key was free and is now held by the caller
    Acquired,
    /// Another request holds the key and has not finished
    InFlight,
    /// A booking was already created under this key
    Completed(Uuid),
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn reserve(&self, key: &str, ttl_seconds: u64) -> Result<Reservation, StoreError>;

    async fn complete(&self, key: &str, booking_id: Uuid, ttl_seconds: u64) -> Result<(), StoreError>;

    async fn release(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
enum Entry {
    Pending,
    Done(Uuid),
}

/// Process-local key store for tests and single-node development.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, (Entry, Instant)>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn reserve(&self, key: &str, ttl_seconds: u64) -> Result<Reservation, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);

        if let Some((entry, _)) = entries.get(key) {
            return Ok(match entry {
                Entry::Pending => Reservation::InFlight,
                Entry::Done(id) => Reservation::Completed(*id),
            });
        }

        entries.insert(
            key.to_string(),
            (Entry::Pending, now + Duration::from_secs(ttl_seconds)),
        );
        Ok(Reservation::Acquired)
    }

    async fn complete(&self, key: &str, booking_id: Uuid, ttl_seconds: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            (Entry::Done(booking_id), Instant::now() + Duration::from_secs(ttl_seconds)),
        );
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
