use crate::middleware::error_handling;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Storage layer unavailable. Surfaced as-is; callers do not retry internally.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Bus publish or session push failed. Never unwinds a preceding write.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Persistence(format!("redis: {e}"))
    }
}

impl AppError {
    pub fn not_found_message(message_id: &str) -> Self {
        AppError::NotFound(format!("message {message_id}"))
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::AlreadyExists(_) => 409,
            AppError::DeliveryFailed(_) => 502,
            AppError::Persistence(_) => 503,
            AppError::Config(_) | AppError::StartServer(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::not_found_message("m1").status_code(), 404);
        assert_eq!(AppError::AlreadyExists("m1".into()).status_code(), 409);
        assert_eq!(AppError::DeliveryFailed("kafka".into()).status_code(), 502);
        assert_eq!(AppError::Persistence("down".into()).status_code(), 503);
    }
}
