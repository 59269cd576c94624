use crate::error::AppError;
use crate::middleware::guards::User;
use crate::state::AppState;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use crate::websocket::SessionId;
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub device_id: Option<String>,
}

// Message type for sending text to WebSocket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct TextMessage(String);

// WebSocket Actor
struct WsSession {
    user_id: String,
    device_id: Option<String>,
    session_id: SessionId,
    state: AppState,
    hb: Instant,
    /// Outbound queue filled by the registry; taken when the actor starts
    outbound: Option<mpsc::Receiver<String>>,
}

// Standalone async function for handling inbound events (avoids borrowing the actor)
async fn handle_ws_event_async(
    state: &AppState,
    user_id: &str,
    evt: WsInboundEvent,
) -> Result<(), AppError> {
    match evt {
        WsInboundEvent::Typing {
            target_user_id,
            typing,
        } => {
            state
                .presence
                .set_typing(user_id, &target_user_id, typing)
                .await?;
        }

        WsInboundEvent::Ack {
            message_id,
            peer_id,
            status,
        } => {
            state
                .chat
                .update_message_status(user_id, &peer_id, &message_id, status)
                .await?;
        }

        // Answered inline by the actor
        WsInboundEvent::Ping => {}
    }
    Ok(())
}

fn error_frame(err: &AppError) -> Option<String> {
    let (_, body) = crate::middleware::error_handling::map_error(err);
    WsOutboundEvent::Error {
        code: body.code,
        message: body.message,
    }
    .to_json()
}

impl WsSession {
    fn new(
        user_id: String,
        device_id: Option<String>,
        session_id: SessionId,
        state: AppState,
        outbound: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            user_id,
            device_id,
            session_id,
            state,
            hb: Instant::now(),
            outbound: Some(outbound),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = %act.user_id, session_id = %act.session_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn start_periodic_tasks(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let state = self.state.clone();
        let user_id = self.user_id.clone();

        ctx.run_interval(self.state.config.refresh_interval(), move |_act, _ctx| {
            let state = state.clone();
            let user_id = user_id.clone();
            actix::spawn(async move {
                state.registry.refresh(&user_id).await;
                if let Err(e) = state.presence.refresh(&user_id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "presence refresh failed");
                }
            });
        });
    }

    /// Forward queued pushes into the actor one at a time; a full mailbox
    /// holds the queue back, which is what makes a slow client time out.
    fn start_forwarder(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(mut rx) = self.outbound.take() else {
            return;
        };
        let addr = ctx.address();
        actix::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if addr.send(TextMessage(payload)).await.is_err() {
                    break;
                }
            }
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            "WebSocket session started"
        );

        self.hb(ctx);
        self.start_periodic_tasks(ctx);
        self.start_forwarder(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            "WebSocket session stopped"
        );

        let state = self.state.clone();
        let user_id = self.user_id.clone();
        let device_id = self.device_id.clone();
        let session_id = self.session_id;

        actix::spawn(async move {
            state.registry.remove(&user_id, session_id).await;
            // Still connected here or on another instance
            if state.registry.is_online(&user_id).await {
                return;
            }
            if let Err(e) = state
                .presence
                .set_presence(&user_id, false, device_id.as_deref())
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "failed to record offline presence");
            }
        });
    }
}

// Handle queued pushes
impl Handler<TextMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: TextMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

// Handle WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(WsInboundEvent::Ping) => {
                        if let Some(pong) = WsOutboundEvent::Pong.to_json() {
                            ctx.text(pong);
                        }
                    }
                    Ok(evt) => {
                        let state = self.state.clone();
                        let user_id = self.user_id.clone();
                        let addr = ctx.address();

                        actix::spawn(async move {
                            if let Err(e) = handle_ws_event_async(&state, &user_id, evt).await {
                                tracing::warn!(user_id = %user_id, error = %e, "Failed to handle WebSocket event");
                                if let Some(frame) = error_frame(&e) {
                                    addr.do_send(TextMessage(frame));
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %self.user_id, error = %e, "Failed to parse WS message");
                        if let Some(frame) =
                            error_frame(&AppError::Validation(format!("invalid event: {e}")))
                        {
                            ctx.text(frame);
                        }
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = %self.user_id, ?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

// HTTP handler
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: User,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    // Register before the upgrade so no push published after connect is missed
    let (session_id, rx) = state.registry.add(&user.id).await;

    let session = WsSession::new(
        user.id.clone(),
        params.device_id.clone(),
        session_id,
        state.as_ref().clone(),
        rx,
    );

    let resp = match ws::start(session, &req, stream) {
        Ok(resp) => resp,
        Err(e) => {
            state.registry.remove(&user.id, session_id).await;
            return Err(e);
        }
    };

    // Presence is only announced for an upgraded connection
    if let Err(e) = state
        .presence
        .set_presence(&user.id, true, params.device_id.as_deref())
        .await
    {
        tracing::warn!(user_id = %user.id, error = %e, "failed to record online presence");
    }
    Ok(resp)
}
