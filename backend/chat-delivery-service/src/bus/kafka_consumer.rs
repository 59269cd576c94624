/// Kafka consumer feeding chat events into the fan-out engine
///
/// One consumer task runs per topic per instance. The consumer group is
/// instance-scoped so every instance sees every event and pushes only to the
/// sessions it holds. Delivery is at-least-once; the engine drops repeats.
use event_schema::ChatEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::fanout::FanoutEngine;

#[derive(Debug, Clone)]
pub struct KafkaEventConsumerConfig {
    /// Kafka broker addresses (comma-separated)
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
}

pub struct KafkaEventConsumer {
    consumer: StreamConsumer,
    engine: Arc<FanoutEngine>,
    config: KafkaEventConsumerConfig,
}

impl KafkaEventConsumer {
    pub fn new(
        config: KafkaEventConsumerConfig,
        engine: Arc<FanoutEngine>,
    ) -> Result<Self, AppError> {
        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topic = %config.topic,
            "Initializing KafkaEventConsumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            // Live fan-out only: a fresh instance has no sessions for older events
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "30000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| AppError::StartServer(format!("Failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| AppError::StartServer(format!("Failed to subscribe to topic: {e}")))?;

        info!(topic = %config.topic, "Subscribed to Kafka topic");

        Ok(Self {
            consumer,
            engine,
            config,
        })
    }

    /// Consume forever, restarting the loop after a broker error
    pub async fn start_consuming(self: Arc<Self>) {
        info!(topic = %self.config.topic, "Starting KafkaEventConsumer loop");

        loop {
            match self.consume_loop().await {
                Ok(()) => {
                    warn!(topic = %self.config.topic, "Kafka consumer loop exited, restarting");
                }
                Err(e) => {
                    error!(topic = %self.config.topic, error = %e, "Kafka consumer error, retrying in 5s");
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn consume_loop(&self) -> Result<(), AppError> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    // A bad record must not stall the partition
                    if let Err(e) = self.handle_message(&message).await {
                        error!(topic = %self.config.topic, error = %e, "Failed to handle Kafka message");
                    }
                }
                Err(e) => {
                    return Err(AppError::DeliveryFailed(format!("Kafka recv failed: {e}")));
                }
            }
        }
    }

    async fn handle_message(
        &self,
        message: &rdkafka::message::BorrowedMessage<'_>,
    ) -> Result<(), AppError> {
        let payload = match message.payload() {
            Some(p) => p,
            None => {
                warn!("Received Kafka message with no payload, skipping");
                return Ok(());
            }
        };

        let event: ChatEvent = serde_json::from_slice(payload).map_err(|e| {
            AppError::Validation(format!(
                "invalid chat event (event_type header: {:?}): {e}",
                header_value(message, "event_type")
            ))
        })?;

        self.engine.handle(event).await;
        Ok(())
    }
}

fn header_value<'a>(
    message: &'a rdkafka::message::BorrowedMessage<'a>,
    key: &str,
) -> Option<&'a str> {
    let headers = message.headers()?;
    headers
        .iter()
        .find(|h| h.key == key)
        .and_then(|h| h.value)
        .and_then(|v| std::str::from_utf8(v).ok())
}
