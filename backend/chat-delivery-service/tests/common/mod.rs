//! In-process wiring shared by the integration tests: in-memory message
//! store, ephemeral store and bus, with the fan-out engine driven by hand so
//! every outcome can be asserted.

#![allow(dead_code)]

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use chat_delivery_service::{
    bus::InMemoryEventBus,
    config::Config,
    ephemeral::InMemoryEphemeralStore,
    fanout::{FanoutEngine, FanoutOutcome},
    repository::InMemoryMessageRepository,
    routes,
    services::{ChatService, PresenceService},
    state::AppState,
    websocket::SessionRegistry,
};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub state: AppState,
    pub bus: InMemoryEventBus,
    pub repo: InMemoryMessageRepository,
    pub store: Arc<InMemoryEphemeralStore>,
    pub engine: Arc<FanoutEngine>,
    cursor: AtomicUsize,
}

impl Harness {
    pub fn new() -> Self {
        Self::instance("test-instance", Arc::new(InMemoryEphemeralStore::new()))
    }

    /// Instances sharing `store` see each other's session markers
    pub fn with_store(store: Arc<InMemoryEphemeralStore>) -> Self {
        Self::instance(&format!("test-{}", uuid::Uuid::new_v4()), store)
    }

    pub fn instance(instance_id: &str, store: Arc<InMemoryEphemeralStore>) -> Self {
        let mut config = Config::test_defaults();
        config.instance_id = instance_id.to_string();
        let config = Arc::new(config);
        let repo = InMemoryMessageRepository::new();
        let bus = InMemoryEventBus::new();

        let registry = SessionRegistry::new(
            config.instance_id.clone(),
            store.clone(),
            config.session_ttl,
            config.push_timeout,
            config.session_buffer,
        );
        let engine = Arc::new(FanoutEngine::new(registry.clone(), config.dedup_ttl));

        let state = AppState {
            config: config.clone(),
            chat: ChatService::new(Arc::new(repo.clone()), Arc::new(bus.clone()), config.clone()),
            presence: PresenceService::new(
                store.clone(),
                Arc::new(bus.clone()),
                config.presence_ttl,
                config.typing_ttl,
            ),
            registry,
        };

        Self {
            state,
            bus,
            repo,
            store,
            engine,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Run every event published since the last call through the engine
    pub async fn deliver_pending(&self) -> Vec<FanoutOutcome> {
        let published = self.bus.published().await;
        let start = self.cursor.swap(published.len(), Ordering::SeqCst);
        let mut outcomes = Vec::new();
        for p in published.into_iter().skip(start) {
            outcomes.push(self.engine.handle(p.event).await);
        }
        outcomes
    }
}

/// Parse the next queued push for a session
pub fn next_push(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Option<serde_json::Value> {
    rx.try_recv()
        .ok()
        .map(|raw| serde_json::from_str(&raw).expect("push is JSON"))
}

/// Serve the full route table for `state` on an ephemeral local port
pub async fn start_server(state: AppState) -> std::io::Result<(SocketAddr, ServerHandle)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .workers(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(server);
    Ok((addr, handle))
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
