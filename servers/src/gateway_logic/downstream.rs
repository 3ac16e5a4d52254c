use anyhow::Result;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{Sink, SinkExt, StreamExt};
use lib_feedrelay::core::defaults::{
    CLOSE_POLICY_VIOLATION, CLOSE_TRY_AGAIN_LATER, CLOSING_TIME, INVALID_AUTHORIZATION,
};
use lib_feedrelay::core::session::new_session_id;
use lib_feedrelay::core::{Frame, SessionHandle};
use lib_feedrelay::inbound::router::reply_error;
use lib_feedrelay::{Dispatcher, RelayError};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::CorsLayer;

use crate::gateway_logic::state::GatewayState;

/// How long a closing connection's writer may take to flush what is queued.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// The gateway's HTTP surface: the WebSocket endpoint at `/` and `/ws`, plus `/health`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves until the dispatcher has drained and closed.
pub async fn serve(listener: TcpListener, state: GatewayState) -> Result<()> {
    let dispatcher = Arc::clone(&state.dispatcher);
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            dispatcher.closed().await;
            tracing::info!("dispatcher closed, stopping the listener");
        })
        .await?;
    Ok(())
}

/// True when `headers` carry `Authorization: Bearer <secret>`. The scheme is
/// case-insensitive. The token must equal the secret byte for byte, with no
/// surrounding whitespace.
pub fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    match value.split_once(' ') {
        Some((scheme, token)) => {
            scheme.eq_ignore_ascii_case("Bearer") && !secret.is_empty() && token == secret
        }
        None => false,
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    let authorized = authorized(&headers, &state.settings.secret);
    ws.on_upgrade(move |socket| handle_socket(socket, state, authorized))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn refuse(mut socket: WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame { code, reason: reason.into() };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "could not send refusal close frame");
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState, authorized: bool) {
    let dispatcher = &state.dispatcher;
    if !dispatcher.admits_connections() {
        tracing::info!("connection refused, gateway is closing");
        return refuse(socket, CLOSE_TRY_AGAIN_LATER, CLOSING_TIME).await;
    }
    if !authorized {
        tracing::warn!("connection refused, missing or invalid authorization");
        return refuse(socket, CLOSE_POLICY_VIOLATION, INVALID_AUTHORIZATION).await;
    }

    let (mut sink, mut stream) = socket.split();
    let (session, frames) = SessionHandle::channel(new_session_id());

    // Frames queued before the writer starts are kept by the channel.
    if let Err(e) = dispatcher.connect(session.clone()) {
        tracing::info!(session = session.id(), error = %e, "connection refused");
        let frame = CloseFrame { code: CLOSE_TRY_AGAIN_LATER, reason: CLOSING_TIME.into() };
        let _ = sink.send(Message::Close(Some(frame))).await;
        return;
    }
    tracing::info!(session = session.id(), clients = dispatcher.session_count(), "client connected");

    let mut writer = tokio::spawn(write_frames(sink, frames));
    let mut writer_done = false;

    loop {
        tokio::select! {
            // The writer stops after a close frame or a failed write.
            _ = &mut writer => {
                writer_done = true;
                break;
            }
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    state.router.handle_text(&session, text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    on_transport_error(dispatcher, &session, &e);
                    break;
                }
            },
        }
    }

    let id = session.id().to_string();
    dispatcher.disconnect(&id);
    // The writer ends once every handle is gone, after flushing what is queued.
    drop(session);
    if !writer_done && tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        tracing::debug!(session = %id, "writer did not finish in time, aborting");
        writer.abort();
    }
    tracing::info!(session = %id, clients = dispatcher.session_count(), "client disconnected");
}

/// Reports a socket failure and tells the session what went wrong.
fn on_transport_error(dispatcher: &Dispatcher, session: &SessionHandle, error: &impl Display) {
    let text = error.to_string();
    tracing::warn!(session = session.id(), error = %text, "socket error");
    dispatcher.reporter().report("socket", &RelayError::Transport(text.clone()));
    reply_error(session, &text);
}

/// Drains a connection's frames into its socket. Stops after a close frame, a
/// failed write, or once every [`SessionHandle`] for the connection is dropped.
async fn write_frames<S>(mut sink: S, mut frames: UnboundedReceiver<Frame>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = frames.recv().await {
        match frame {
            Frame::Text { payload, ack } => {
                let result = sink
                    .send(Message::Text(payload.as_ref().into()))
                    .await
                    .map_err(|e| e.to_string());
                let failed = result.is_err();
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
                if failed {
                    break;
                }
            }
            Frame::Close { code, reason } => {
                let frame = CloseFrame { code, reason: reason.into() };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}
