pub mod message;
pub mod presence;

pub use message::*;
pub use presence::*;
