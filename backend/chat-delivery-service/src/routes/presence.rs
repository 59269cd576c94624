/// Presence and typing endpoints
use actix_web::{get, post, put, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{BatchPresenceRequest, TypingRequest, UpdatePresenceRequest, UpdateStatusLabelRequest};
use crate::state::AppState;

/// Upper bound on ids in one batch lookup
const MAX_BATCH: usize = 200;

/// **Endpoint**: `PUT /api/v1/presence`
#[put("/api/v1/presence")]
pub async fn update_presence(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<UpdatePresenceRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let record = state
        .presence
        .set_presence(&user.id, body.online, body.device_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

/// **Endpoint**: `PUT /api/v1/presence/status`
#[put("/api/v1/presence/status")]
pub async fn update_status(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<UpdateStatusLabelRequest>,
) -> Result<HttpResponse, AppError> {
    let record = state.presence.set_status(&user.id, body.status).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Typing indicators aimed at the caller
///
/// **Endpoint**: `GET /api/v1/presence/typing`
#[get("/api/v1/presence/typing")]
pub async fn get_typing(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let indicators = state.presence.get_typing_indicators(&user.id).await?;
    Ok(HttpResponse::Ok().json(indicators))
}

/// Diagnostics: every online user id
///
/// **Endpoint**: `GET /api/v1/presence/online`
#[get("/api/v1/presence/online")]
pub async fn get_online(
    state: web::Data<AppState>,
    _user: User,
) -> Result<HttpResponse, AppError> {
    let user_ids = state.presence.online_user_ids().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": user_ids.len(),
        "user_ids": user_ids,
    })))
}

/// **Endpoint**: `PUT /api/v1/presence/typing/{target_user_id}`
#[put("/api/v1/presence/typing/{target_user_id}")]
pub async fn set_typing(
    state: web::Data<AppState>,
    user: User,
    target_user_id: web::Path<String>,
    body: web::Json<TypingRequest>,
) -> Result<HttpResponse, AppError> {
    let record = state
        .presence
        .set_typing(&user.id, &target_user_id.into_inner(), body.typing)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

/// **Endpoint**: `POST /api/v1/presence/batch`
#[post("/api/v1/presence/batch")]
pub async fn get_presence_batch(
    state: web::Data<AppState>,
    _user: User,
    body: web::Json<BatchPresenceRequest>,
) -> Result<HttpResponse, AppError> {
    if body.user_ids.len() > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH} user ids per batch"
        )));
    }
    let records = state.presence.get_presences(&body.user_ids).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// **Endpoint**: `GET /api/v1/presence/{user_id}`
#[get("/api/v1/presence/{user_id}")]
pub async fn get_presence(
    state: web::Data<AppState>,
    _user: User,
    user_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let record = state.presence.get_presence(&user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}
