use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::StoreError;

/// Outbound channel for booking lifecycle events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), StoreError>;
}

/// Publisher that keeps every event in memory, in publish order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published `(topic, key, payload)` triples
    pub async fn events(&self) -> Vec<(String, String, String)> {
        self.events.lock().await.clone()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|(topic, _, _)| topic.clone()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), StoreError> {
        self.events
            .lock()
            .await
            .push((topic.to_string(), key.to_string(), payload.to_string()));
        Ok(())
    }
}
