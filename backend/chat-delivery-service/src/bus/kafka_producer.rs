//! Kafka producer for chat events
//!
//! Every event is written with its partition key as the record key and its
//! type in the `event_type` header, so consumers can filter without parsing.

use async_trait::async_trait;
use event_schema::ChatEvent;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

use super::EventPublisher;
use crate::error::{AppError, AppResult};
use crate::metrics;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str) -> Result<Self, AppError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("retries", "3")
            .set("retry.backoff.ms", "100")
            .create()
            .map_err(|e| AppError::StartServer(format!("Failed to create Kafka producer: {e}")))?;

        tracing::info!(brokers = %brokers, "KafkaEventPublisher initialized");

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn emit(&self, topic: &str, partition_key: &str, event: &ChatEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::DeliveryFailed(format!("serialize event: {e}")))?;

        let headers = OwnedHeaders::new().insert(Header {
            key: "event_type",
            value: Some(event.event_type.as_str()),
        });

        let record = FutureRecord::to(topic)
            .key(partition_key)
            .payload(&payload)
            .headers(headers);

        match self.producer.send(record, SEND_TIMEOUT).await {
            Ok((partition, offset)) => {
                metrics::record_publish(topic, true);
                tracing::debug!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    partition = partition,
                    offset = offset,
                    "Chat event published to Kafka"
                );
                Ok(())
            }
            Err((e, _)) => {
                metrics::record_publish(topic, false);
                tracing::error!(
                    error = %e,
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    topic = %topic,
                    "Failed to publish chat event to Kafka"
                );
                Err(AppError::DeliveryFailed(format!("publish to {topic}: {e}")))
            }
        }
    }
}
