/// Direct message endpoints
///
/// Conversations are addressed by the peer's user id; the caller is always
/// the other participant.
use actix_web::{get, post, put, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{
    BeforeQuery, EditMessageRequest, HistoryQuery, LatestQuery, SendMessageRequest,
    UpdateStatusRequest,
};
use crate::state::AppState;

/// **Endpoint**: `POST /api/v1/chat/messages`
#[post("/api/v1/chat/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .chat
        .send_message(body.into_inner().into_new_message(&user.id))
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// Unacknowledged messages addressed to the caller
///
/// **Endpoint**: `GET /api/v1/chat/messages/unread`
#[get("/api/v1/chat/messages/unread")]
pub async fn get_unread(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let messages = state.chat.get_unread(&user.id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// Newest messages with `peer`, newest first
///
/// **Endpoint**: `GET /api/v1/chat/messages/{peer}?limit=`
#[get("/api/v1/chat/messages/{peer}")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    peer: web::Path<String>,
    query: web::Query<LatestQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .chat
        .get_messages(&user.id, &peer.into_inner(), query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// Older page, strictly before `timestamp`
///
/// **Endpoint**: `GET /api/v1/chat/messages/{peer}/before?timestamp=&limit=`
#[get("/api/v1/chat/messages/{peer}/before")]
pub async fn get_messages_before(
    state: web::Data<AppState>,
    user: User,
    peer: web::Path<String>,
    query: web::Query<BeforeQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let messages = state
        .chat
        .get_messages_before(&user.id, &peer.into_inner(), query.timestamp, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// **Endpoint**: `GET /api/v1/chat/messages/{peer}/history?start=&end=`
#[get("/api/v1/chat/messages/{peer}/history")]
pub async fn get_history(
    state: web::Data<AppState>,
    user: User,
    peer: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .chat
        .get_history(&user.id, &peer.into_inner(), query.start, query.end)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// **Endpoint**: `PUT /api/v1/chat/messages/{message_id}/status`
#[put("/api/v1/chat/messages/{message_id}/status")]
pub async fn update_status(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<String>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let message = state
        .chat
        .update_message_status(&user.id, &body.peer_id, &message_id.into_inner(), body.status)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

/// **Endpoint**: `PUT /api/v1/chat/messages/{message_id}/edit`
#[put("/api/v1/chat/messages/{message_id}/edit")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<String>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let message = state
        .chat
        .edit_message(&user.id, &body.peer_id, &message_id.into_inner(), &body.content)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}
