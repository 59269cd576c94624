pub mod bus;
pub mod config;
pub mod conversation;
pub mod db;
pub mod ephemeral;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod redis_client;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;

/// Event `source` and log identity of this service
pub const SERVICE_NAME: &str = "chat-delivery-service";
