use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::VALIDATION_ERROR),
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_MISSING),
        AppError::Forbidden(_) => (kinds::AUTHENTICATION_ERROR, error_codes::FORBIDDEN),
        AppError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::MESSAGE_NOT_FOUND),
        AppError::AlreadyExists(_) => (kinds::CONFLICT_ERROR, error_codes::MESSAGE_ALREADY_EXISTS),
        AppError::Persistence(_) => (
            kinds::SERVICE_UNAVAILABLE_ERROR,
            error_codes::DATABASE_ERROR,
        ),
        AppError::DeliveryFailed(_) => (kinds::SERVER_ERROR, error_codes::EVENT_DELIVERY_FAILED),
        AppError::Config(_) | AppError::StartServer(_) => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    let message = err.to_string();
    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    if status.is_server_error() {
        tracing::warn!(error = %err, code = %response.code, "request failed");
    }
    HttpResponse::build(status).json(response)
}
