use serde::Deserialize;

pub use event_schema::{PresenceRecord, PresenceStatus, TypingRecord};

#[derive(Debug, Deserialize)]
pub struct UpdatePresenceRequest {
    pub online: bool,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusLabelRequest {
    pub status: PresenceStatus,
}

#[derive(Debug, Deserialize)]
pub struct BatchPresenceRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub typing: bool,
}
