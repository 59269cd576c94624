use async_trait::async_trait;
use event_schema::ChatEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use super::EventPublisher;
use crate::error::{AppError, AppResult};
use crate::fanout::FanoutEngine;

const CHANNEL_CAPACITY: usize = 1024;

/// An event as it was handed to the bus
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub partition_key: String,
    pub event: ChatEvent,
}

/// In-process bus: records every emission and forwards it to subscribers.
///
/// Single-node development runs and tests use it in place of Kafka.
#[derive(Clone)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<PublishedEvent>>>,
    sender: broadcast::Sender<PublishedEvent>,
    unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            published: Arc::new(Mutex::new(Vec::new())),
            sender,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every emit fail with `DeliveryFailed` until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().await.clone()
    }

    pub async fn published_on(&self, topic: &str) -> Vec<PublishedEvent> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Feed every subsequently published event into `engine`
    pub fn spawn_dispatcher(&self, engine: Arc<FanoutEngine>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(published) => {
                        engine.handle(published.event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-memory dispatcher lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn emit(&self, topic: &str, partition_key: &str, event: &ChatEvent) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DeliveryFailed(format!("bus unavailable for {topic}")));
        }

        let published = PublishedEvent {
            topic: topic.to_string(),
            partition_key: partition_key.to_string(),
            event: event.clone(),
        };
        self.published.lock().await.push(published.clone());
        // No subscribers is fine: the event is still recorded
        let _ = self.sender.send(published);
        Ok(())
    }
}
