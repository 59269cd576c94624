pub mod chat_service;
pub mod presence_service;

pub use chat_service::ChatService;
pub use presence_service::PresenceService;
