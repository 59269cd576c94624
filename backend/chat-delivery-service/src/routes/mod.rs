use actix_web::web;

pub mod health;
pub mod messages;
pub mod presence;
pub mod wsroute;

/// Register every endpoint. Literal paths go before the `{param}` routes
/// they would otherwise be captured by.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(messages::send_message)
        .service(messages::get_unread)
        .service(messages::get_messages_before)
        .service(messages::get_history)
        .service(messages::get_messages)
        .service(messages::update_status)
        .service(messages::edit_message)
        .service(presence::update_presence)
        .service(presence::update_status)
        .service(presence::get_typing)
        .service(presence::get_online)
        .service(presence::set_typing)
        .service(presence::get_presence_batch)
        .service(presence::get_presence)
        .service(wsroute::ws_handler)
        .service(health::health)
        .route("/metrics", web::get().to(crate::metrics::metrics_handler));
}
