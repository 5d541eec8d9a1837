use std::time::{Duration, Instant};

use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::auth::{AuthUser, bearer_token};
use crate::auth::jwt::verify_token;
use crate::config::Config;

use super::Realtime;
use super::events::{ChangeEvent, ClientMessage, PushMessage};
use super::hub::Registration;

#[derive(Debug, serde::Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// `GET /ws?token=…`. The access token is checked before the upgrade; a bad
/// or missing token never gets a socket.
pub async fn ws_connect(
    req: HttpRequest,
    body: web::Payload,
    query: web::Query<SocketQuery>,
    config: web::Data<Config>,
    realtime: web::Data<Realtime>,
) -> actix_web::Result<HttpResponse> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&req))
        .ok_or_else(|| actix_web::error::ErrorUnauthorized("Missing token"))?;

    let user = verify_token(token, &config.jwt_secret)
        .map_err(|e| {
            debug!("Socket token rejected: {}", e);
            actix_web::error::ErrorUnauthorized("Invalid or expired token")
        })
        .and_then(|claims| AuthUser::from_claims(claims).map_err(actix_web::error::ErrorUnauthorized))?;

    let (response, session, stream) = actix_ws::handle(&req, body)?;

    let (tx, rx) = mpsc::channel(config.ws_outbound_buffer.max(1));
    let registration = realtime.hub.register(user.user_id, tx);
    info!(user_id = user.user_id, connection_id = %registration.id, "Socket connected");

    let timing = Heartbeat {
        interval: config.ws_heartbeat,
        client_timeout: config.ws_client_timeout,
    };
    actix_web::rt::spawn(run_session(
        session,
        stream,
        rx,
        registration,
        realtime.get_ref().clone(),
        timing,
    ));

    Ok(response)
}

#[derive(Debug, Clone, Copy)]
struct Heartbeat {
    interval: Duration,
    client_timeout: Duration,
}

async fn run_session(
    mut session: Session,
    mut stream: MessageStream,
    mut outbound: mpsc::Receiver<String>,
    registration: Registration,
    realtime: Realtime,
    timing: Heartbeat,
) {
    let user_id = registration.user_id;

    // first frame is the state to reconcile against
    match realtime.counter.counts(user_id).await {
        Ok(counts) => {
            if send(&mut session, &PushMessage::from(counts)).await.is_err() {
                realtime.hub.unregister(registration);
                return;
            }
        }
        Err(e) => warn!(user_id, "Could not load initial counts: {}", e),
    }

    let mut last_seen = Instant::now();
    let mut ticker = tokio::time::interval(timing.interval);

    let reason = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    last_seen = Instant::now();
                    if handle_client_frame(&mut session, &realtime, user_id, &text).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Ping(bytes))) => {
                    last_seen = Instant::now();
                    if session.pong(&bytes).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Pong(_))) => last_seen = Instant::now(),
                Some(Ok(Message::Close(reason))) => break reason,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(user_id, "Socket protocol error: {}", e);
                    break None;
                }
                None => break None,
            },
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if session.text(text).await.is_err() {
                        break None;
                    }
                }
                None => {
                    // hub dropped us; the client reconnects and refetches
                    break Some(CloseReason {
                        code: CloseCode::Again,
                        description: Some("resync".into()),
                    });
                }
            },
            _ = ticker.tick() => {
                if last_seen.elapsed() > timing.client_timeout {
                    info!(user_id, "Socket heartbeat timed out");
                    break None;
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
            }
        }
    };

    realtime.hub.unregister(registration);
    let _ = session.close(reason).await;
    info!(user_id, connection_id = %registration.id, "Socket disconnected");
}

async fn handle_client_frame(
    session: &mut Session,
    realtime: &Realtime,
    user_id: u64,
    text: &str,
) -> Result<(), actix_ws::Closed> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(user_id, "Ignoring malformed client frame: {}", e);
            return Ok(());
        }
    };

    match message {
        ClientMessage::MarkRead { other_user_id } => {
            match realtime.counter.mark_read(user_id, other_user_id).await {
                // the dispatcher pushes fresh counts to all of this user's sockets
                Ok(_) => realtime.bus.publish(ChangeEvent::MessagesRead { user_id }),
                Err(e) => warn!(user_id, other_user_id, "Failed to mark messages read: {}", e),
            }
            Ok(())
        }
        ClientMessage::RefreshCounts => match realtime.counter.recount(user_id).await {
            Ok(counts) => send(session, &PushMessage::from(counts)).await,
            Err(e) => {
                warn!(user_id, "Failed to recount: {}", e);
                Ok(())
            }
        },
    }
}

async fn send(session: &mut Session, message: &PushMessage) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(message) {
        Ok(text) => session.text(text).await,
        Err(e) => {
            warn!("Failed to encode push message: {}", e);
            Ok(())
        }
    }
}
