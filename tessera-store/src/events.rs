use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use tessera_core::events::EventPublisher;
use tessera_core::CoreError;

#[cfg(feature = "kafka")]
pub use kafka::KafkaEventProducer;

/// Writes events to the log only. Used when no broker is configured.
#[derive(Clone, Default)]
pub struct LogEventProducer;

#[async_trait]
impl EventPublisher for LogEventProducer {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), CoreError> {
        info!(topic, key, payload, "event");
        Ok(())
    }
}

/// Picks the Kafka producer when brokers are configured and the `kafka`
/// feature is compiled in, the log producer otherwise.
pub fn event_producer(brokers: Option<&str>) -> Result<Arc<dyn EventPublisher>, CoreError> {
    match brokers {
        #[cfg(feature = "kafka")]
        Some(brokers) => Ok(Arc::new(KafkaEventProducer::new(brokers).map_err(|e| {
            CoreError::InternalError(format!("Failed to create Kafka producer: {}", e))
        })?)),
        #[cfg(not(feature = "kafka"))]
        Some(brokers) => {
            warn!(brokers, "Kafka brokers configured but the kafka feature is disabled; logging events instead");
            Ok(Arc::new(LogEventProducer))
        }
        None => Ok(Arc::new(LogEventProducer)),
    }
}

#[cfg(feature = "kafka")]
mod kafka {
    use async_trait::async_trait;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::{error, info};

    use tessera_core::events::EventPublisher;
    use tessera_core::CoreError;

    #[derive(Clone)]
    pub struct KafkaEventProducer {
        producer: FutureProducer,
    }

    impl KafkaEventProducer {
        pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self { producer })
        }
    }

    #[async_trait]
    impl EventPublisher for KafkaEventProducer {
        async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), CoreError> {
            let record = FutureRecord::to(topic)
                .key(key)
                .payload(payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(CoreError::InternalError(e.to_string()))
                }
            }
        }
    }
}
