use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::state::AppState;
use crate::ws::protocol::{InboundEvent, InboundMessage, Payload};
use crate::ws::{Connection, ConnectionStatus, CLOSE_SUPERSEDED};

/// Where a channel is in its lifecycle, from the relay's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, no `auth` frame yet. Unreachable by the router.
    Connected,
    /// Registered under `user_id`.
    Authenticated { user_id: String },
}

impl SessionState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Connected => None,
            Self::Authenticated { user_id } => Some(user_id.as_str()),
        }
    }
}

/// Run the actor-per-connection pattern for an accepted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Reader loop: decodes inbound frames and drives the session state
///
/// The channel is registered only once it authenticates and is unregistered
/// when the reader loop ends, whatever the reason.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let connection = Connection::new(tx);
    let mut session = SessionState::Connected;

    tracing::info!(
        connection_id = %connection.id(),
        peer = %peer,
        "WebSocket channel opened"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    handle_text_message(text.as_str(), &connection, &mut session, &state);
                }
                Message::Binary(data) => {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        bytes = data.len(),
                        "Discarding binary frame (protocol is JSON text)"
                    );
                }
                Message::Ping(data) => {
                    let _ = connection.send(Message::Pong(data));
                }
                Message::Pong(_) => {}
                Message::Close(frame) => {
                    connection.set_status(ConnectionStatus::Closing);
                    tracing::info!(
                        connection_id = %connection.id(),
                        user_id = ?session.user_id(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    user_id = ?session.user_id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(
                    connection_id = %connection.id(),
                    user_id = ?session.user_id(),
                    "WebSocket stream ended"
                );
                break;
            }
        }
    }

    connection.set_status(ConnectionStatus::Closed);
    writer_handle.abort();
    let removed = state.registry.unregister(&connection);

    tracing::info!(
        connection_id = %connection.id(),
        user_id = ?session.user_id(),
        unregistered = removed,
        "WebSocket channel closed"
    );
}

/// Writer task: receives frames from the mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}

/// Decode one text frame and apply it to the session.
///
/// Malformed frames are logged and dropped; the channel stays open.
pub fn handle_text_message(
    text: &str,
    connection: &Connection,
    session: &mut SessionState,
    state: &AppState,
) {
    match InboundMessage::decode(text) {
        Ok(InboundMessage::Auth { user_id }) => authenticate(user_id, connection, session, state),
        Ok(InboundMessage::Passthrough(payload)) => forward(payload, connection, session, state),
        Err(e) => {
            tracing::warn!(
                connection_id = %connection.id(),
                user_id = ?session.user_id(),
                error = %e,
                "Discarding malformed message"
            );
        }
    }
}

fn authenticate(
    user_id: String,
    connection: &Connection,
    session: &mut SessionState,
    state: &AppState,
) {
    // A channel answers to one identity at a time.
    if let Some(current) = session.user_id() {
        if current != user_id {
            state.registry.unregister(connection);
            tracing::info!(
                connection_id = %connection.id(),
                from = %current,
                to = %user_id,
                "Channel re-authenticated under a new identity"
            );
        }
    }

    if let Some(previous) = state.registry.register(&user_id, connection.clone()) {
        if state.close_superseded {
            previous.close(CLOSE_SUPERSEDED, "superseded");
            tracing::info!(
                user_id = %user_id,
                superseded = %previous.id(),
                "Closed superseded channel"
            );
        } else {
            tracing::debug!(
                user_id = %user_id,
                superseded = %previous.id(),
                "Superseded channel left open"
            );
        }
    }

    tracing::info!(
        user_id = %user_id,
        connection_id = %connection.id(),
        "Channel authenticated"
    );
    *session = SessionState::Authenticated { user_id };
}

fn forward(payload: Payload, connection: &Connection, session: &SessionState, state: &AppState) {
    tracing::debug!(
        connection_id = %connection.id(),
        user_id = ?session.user_id(),
        kind = %payload.kind(),
        "Forwarding inbound message"
    );

    let event = InboundEvent {
        connection_id: connection.id(),
        user_id: session.user_id().map(str::to_string),
        payload,
    };
    if state.inbound_tx.send(event).is_err() {
        tracing::debug!(
            connection_id = %connection.id(),
            "No inbound consumer, message dropped"
        );
    }
}
