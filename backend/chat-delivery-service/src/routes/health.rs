use actix_web::{get, web, HttpResponse};

use crate::state::AppState;

/// Liveness plus a little local context for operators
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": crate::SERVICE_NAME,
        "instance_id": state.config.instance_id,
        "local_sessions": state.registry.session_count(),
    }))
}
