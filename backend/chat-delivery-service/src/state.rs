use crate::{
    config::Config,
    services::{ChatService, PresenceService},
    websocket::SessionRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chat: ChatService,
    pub presence: PresenceService,
    /// Live sessions held by this instance
    pub registry: SessionRegistry,
}
