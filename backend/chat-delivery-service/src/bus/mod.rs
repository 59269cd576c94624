//! Event bus contract between message mutation and delivery.
//!
//! Publishing is a synchronous handoff to the bus client. A failure surfaces
//! as `DeliveryFailed` and never rolls back the store write that preceded it.
//! Consumers see every event at least once and must tolerate redelivery.

use async_trait::async_trait;
use event_schema::ChatEvent;

use crate::error::AppResult;

pub mod kafka_consumer;
pub mod kafka_producer;
pub mod memory;

pub use kafka_consumer::{KafkaEventConsumer, KafkaEventConsumerConfig};
pub use kafka_producer::KafkaEventPublisher;
pub use memory::{InMemoryEventBus, PublishedEvent};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hand `event` to the bus on `topic`, ordered within `partition_key`
    async fn emit(&self, topic: &str, partition_key: &str, event: &ChatEvent) -> AppResult<()>;

    /// Emit on the event's own topic and partition key
    async fn publish(&self, event: &ChatEvent) -> AppResult<()> {
        self.emit(event.topic(), event.partition_key(), event).await
    }
}
