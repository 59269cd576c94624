pub mod message_types;
pub mod registry;

pub use registry::{SessionId, SessionRegistry};
