//! Caller identity extraction
//!
//! Authentication happens at the edge; the gateway forwards the verified user
//! id in `x-user-id`. Handlers take a `User` argument so an unauthenticated
//! request cannot reach them.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};

use crate::conversation::validate_user_id;
use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
}

impl User {
    fn from_headers(req: &HttpRequest) -> Result<Self, AppError> {
        let id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Unauthorized)?;
        validate_user_id(id)?;
        Ok(User { id: id.to_string() })
    }
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(User::from_headers(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_header_is_required() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(User::from_headers(&req), Err(AppError::Unauthorized));
    }

    #[test]
    fn test_header_is_validated() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "bad_id"))
            .to_http_request();
        assert!(matches!(
            User::from_headers(&req),
            Err(AppError::Validation(_))
        ));

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "u1"))
            .to_http_request();
        assert_eq!(User::from_headers(&req).unwrap().id, "u1");
    }
}
