use async_trait::async_trait;
use serde::Serialize;

use crate::CoreError;

/// Outbound domain events (Kafka in production).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), CoreError>;
}

/// Serializes and publishes `event`. Delivery failures are logged, never
/// propagated: the state change they describe has already been committed.
pub async fn publish_event<T: Serialize>(
    publisher: &dyn EventPublisher,
    topic: &str,
    key: &str,
    event: &T,
) {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(topic, key, "Failed to serialize event: {}", e);
            return;
        }
    };

    if let Err(e) = publisher.publish(topic, key, &payload).await {
        tracing::warn!(topic, key, "Event publish failed: {}", e);
    }
}
