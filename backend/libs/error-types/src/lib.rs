use serde::{Deserialize, Serialize};

/// Uniform API error body returned by every HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short human label, e.g. "Not Found"
    pub error: String,

    /// User-facing explanation
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error category used by clients to route handling, one of [`error_types`]
    pub error_type: String,

    /// Machine-readable code, one of [`error_codes`]
    pub code: String,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error codes returned in [`ErrorResponse::code`]
pub mod error_codes {
    // Messages
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const MESSAGE_ALREADY_EXISTS: &str = "MESSAGE_ALREADY_EXISTS";

    // Bus
    pub const EVENT_DELIVERY_FAILED: &str = "EVENT_DELIVERY_FAILED";

    // Authentication
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const FORBIDDEN: &str = "FORBIDDEN";

    // Database/System
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Error categories returned in [`ErrorResponse::error_type`]
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
