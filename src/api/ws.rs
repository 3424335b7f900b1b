/*!
 * WebSocket endpoints.
 *
 * Each socket is split: a forwarding task drains the connection's hub queue
 * into the sink while the reader loop runs on the connection task. Leaving
 * the hub closes the queue, which lets the forwarder flush and close the sink.
 */

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use log::{debug, info};
use serde::Deserialize;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use super::extract::authenticate;
use super::{ApiResult, AppState};
use crate::database::models::UserRole;
use crate::errors::{ApiError, SessionError};
use crate::relay::{FrameSender, PredictionRelay, ServerMessage, Subscription};

/// How long a closing connection waits for its queue to flush
const FORWARDER_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Who is attached to a prediction socket, known before the upgrade
#[derive(Debug, Clone, Copy)]
struct PredictionPeer {
    session_id: i64,
    session_stored: bool,
    patient_id: Option<i64>,
    psychologist_id: Option<i64>,
}

pub async fn chat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((user_id, peer_id)): Path<(i64, i64)>,
) -> Response {
    ws.on_upgrade(move |socket| run_chat(socket, state, user_id, peer_id))
}

async fn run_chat(socket: WebSocket, state: AppState, user_id: i64, peer_id: i64) {
    let Subscription {
        connection_id,
        receiver,
    } = state.chat.connect(user_id, peer_id);
    info!("Chat {} -> {} connected (connection {})", user_id, peer_id, connection_id);

    let (sink, mut stream) = socket.split();
    let forwarder = spawn_forwarder(sink, receiver, Message::Text);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.chat.deliver(user_id, peer_id, connection_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Chat {} -> {} read error: {}", user_id, peer_id, e);
                break;
            }
        }
    }

    state.chat.disconnect(user_id, peer_id, connection_id);
    finish_forwarder(forwarder).await;
    info!("Chat {} -> {} disconnected", user_id, peer_id);
}

/// Authentication and session checks happen before the upgrade so failures
/// are plain HTTP errors.
pub async fn predict_socket(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Response> {
    let user = match query.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => Some(authenticate(&state, token).await?),
        None => None,
    };

    let session = if state.require_active_session {
        let active = state.sessions.require_active(session_id).await.map_err(|e| match e {
            SessionError::NotFound(_) | SessionError::AlreadyClosed(_) => {
                ApiError::NotFound(format!("No active session {}", session_id))
            }
            other => other.into(),
        })?;
        Some(active)
    } else {
        state.repository.get_session(session_id).await?
    };

    let ws = ws.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let peer = PredictionPeer {
        session_id,
        session_stored: session.is_some(),
        patient_id: user.as_ref().filter(|u| u.role == UserRole::Patient).map(|u| u.id),
        psychologist_id: user
            .as_ref()
            .filter(|u| u.role == UserRole::Psychologist)
            .map(|u| u.id)
            .or_else(|| session.as_ref().and_then(|s| s.psychologist_id)),
    };

    Ok(ws.on_upgrade(move |socket| run_predictions(socket, state, peer)).into_response())
}

async fn run_predictions(socket: WebSocket, state: AppState, peer: PredictionPeer) {
    let relay = state.predictions.clone();
    let Subscription {
        connection_id,
        receiver,
    } = relay.join(peer.session_id);
    info!(
        "Prediction socket {} joined session {} ({} connected)",
        connection_id,
        peer.session_id,
        relay.subscriber_count(peer.session_id)
    );

    let sender = FrameSender {
        session_id: peer.session_id,
        connection_id,
        session_stored: peer.session_stored,
        patient_id: peer.patient_id,
        psychologist_id: peer.psychologist_id,
    };

    let (sink, stream) = socket.split();
    let forwarder = spawn_forwarder(sink, receiver, |message: ServerMessage| Message::Text(message.to_json()));

    read_frames(&relay, &sender, stream, state.idle_timeout).await;
    finish_forwarder(forwarder).await;
    info!("Prediction socket {} left session {}", connection_id, peer.session_id);
}

/// Feed inbound messages to the relay until the client closes, fails or
/// stays silent for `idle_timeout`, then leave the session
async fn read_frames<St, E>(relay: &PredictionRelay, sender: &FrameSender, mut stream: St, idle_timeout: Duration)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let connection_id = sender.connection_id;
    loop {
        let message = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Err(_) => {
                info!("Prediction socket {} idle for {:?}, closing", connection_id, idle_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Prediction socket {} read error: {}", connection_id, e);
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let outcome = match message {
            Message::Text(text) => relay.handle_client_text(sender, &text).await,
            Message::Binary(bytes) => relay.handle_frame_bytes(sender, bytes).await,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        debug!("Session {} connection {}: {:?}", sender.session_id, connection_id, outcome);
    }

    relay.leave(sender.session_id, connection_id);
}

/// Wait for the forwarder to flush, aborting it when the peer stopped reading
async fn finish_forwarder(mut forwarder: JoinHandle<()>) {
    if tokio::time::timeout(FORWARDER_GRACE, &mut forwarder).await.is_err() {
        debug!("Forwarder still blocked after {:?}, aborting", FORWARDER_GRACE);
        forwarder.abort();
    }
}

/// Drain a hub queue into the socket until the queue closes or a send fails
fn spawn_forwarder<M, F>(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: UnboundedReceiver<M>,
    encode: F,
) -> JoinHandle<()>
where
    M: Send + 'static,
    F: Fn(M) -> Message + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if sink.send(encode(message)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    })
}
