pub mod errors;
pub mod id;

pub use errors::{ConciergeError, ConfigError};
pub use id::{connection_tag, fallback_call_id, new_conversation_id, SessionId};

pub type Result<T> = std::result::Result<T, ConciergeError>;
