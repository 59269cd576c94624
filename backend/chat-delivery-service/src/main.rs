use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chat_delivery_service::{
    bus::{
        EventPublisher, InMemoryEventBus, KafkaEventConsumer, KafkaEventConsumerConfig,
        KafkaEventPublisher,
    },
    config::Config,
    db,
    ephemeral::{EphemeralStore, RedisEphemeralStore},
    fanout::FanoutEngine,
    logging,
    redis_client::RedisClient,
    repository::{MessageRepository, PgMessageRepository},
    routes,
    services::{ChatService, PresenceService},
    state::AppState,
    websocket::SessionRegistry,
};
use event_schema::topics;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);
    tracing::info!(
        instance_id = %cfg.instance_id,
        consumer_group = %cfg.consumer_group(),
        "starting chat-delivery-service"
    );

    // Message store
    let db = db::init_pool(&cfg).await.context("initialize database")?;
    let repository: Arc<dyn MessageRepository> = Arc::new(PgMessageRepository::new(db));

    // Presence, typing and session markers
    let redis = RedisClient::from_url(&cfg.redis_url)
        .await
        .context("connect to redis")?;
    let ephemeral: Arc<dyn EphemeralStore> = Arc::new(RedisEphemeralStore::new(redis));

    let registry = SessionRegistry::new(
        cfg.instance_id.clone(),
        ephemeral.clone(),
        cfg.session_ttl,
        cfg.push_timeout,
        cfg.session_buffer,
    );
    let engine = Arc::new(FanoutEngine::new(registry.clone(), cfg.dedup_ttl));
    engine.spawn_dedup_cleanup(cfg.dedup_ttl);

    // Bus: one consumer per topic, in this instance's own group
    let publisher: Arc<dyn EventPublisher> = if cfg.in_memory_bus {
        tracing::warn!("EVENT_BUS=memory: events stay inside this process");
        let bus = InMemoryEventBus::new();
        bus.spawn_dispatcher(engine.clone());
        Arc::new(bus)
    } else {
        let producer = KafkaEventPublisher::new(&cfg.kafka_brokers)?;
        for topic in topics::ALL {
            let consumer = Arc::new(KafkaEventConsumer::new(
                KafkaEventConsumerConfig {
                    brokers: cfg.kafka_brokers.clone(),
                    group_id: cfg.consumer_group(),
                    topic: topic.to_string(),
                },
                engine.clone(),
            )?);
            tokio::spawn(consumer.start_consuming());
        }
        Arc::new(producer)
    };

    let state = AppState {
        config: cfg.clone(),
        chat: ChatService::new(repository, publisher.clone(), cfg.clone()),
        presence: PresenceService::new(ephemeral, publisher, cfg.presence_ttl, cfg.typing_ttl),
        registry,
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting HTTP server");

    // actix-web HttpServer futures are not Send, so it runs in the foreground
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("bind {bind_addr}"))?
    .run()
    .await
    .context("HTTP server")?;

    Ok(())
}
