//! Targeted delivery of outbound messages to registered channels.
//!
//! Delivery is best-effort and synchronous with the call: a frame is either
//! queued on the target's writer right now or dropped. Nothing is retried or
//! stored for later.

use axum::extract::ws::{Message, Utf8Bytes};

use super::protocol::OutboundMessage;
use super::ConnectionRegistry;

/// Who an outbound message is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    SingleUser(String),
    Conversation {
        conversation_id: String,
        /// Delivery order follows this sequence.
        participants: Vec<String>,
        exclude_user_id: Option<String>,
    },
}

/// Send `message` to one user. Returns true only if a frame was queued on an
/// open channel; an offline user and an unknown user look the same.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, message: &OutboundMessage) -> bool {
    match encode(message) {
        Some(frame) => send_frame(registry, user_id, &frame),
        None => false,
    }
}

/// Send `message` to every participant except `exclude_user_id`.
/// Returns how many participants it was delivered to.
pub fn broadcast_to_conversation(
    registry: &ConnectionRegistry,
    conversation_id: &str,
    participants: &[String],
    message: &OutboundMessage,
    exclude_user_id: Option<&str>,
) -> usize {
    let Some(frame) = encode(message) else {
        return 0;
    };

    let delivered = participants
        .iter()
        .filter(|user_id| Some(user_id.as_str()) != exclude_user_id)
        .filter(|user_id| send_frame(registry, user_id, &frame))
        .count();

    tracing::debug!(
        conversation_id = %conversation_id,
        kind = %message.kind(),
        participants = participants.len(),
        delivered = delivered,
        "Conversation broadcast"
    );
    delivered
}

/// Dispatch on a [`Target`]. Returns the number of channels written to.
pub fn deliver(registry: &ConnectionRegistry, target: &Target, message: &OutboundMessage) -> usize {
    match target {
        Target::SingleUser(user_id) => usize::from(send_to_user(registry, user_id, message)),
        Target::Conversation {
            conversation_id,
            participants,
            exclude_user_id,
        } => broadcast_to_conversation(
            registry,
            conversation_id,
            participants,
            message,
            exclude_user_id.as_deref(),
        ),
    }
}

fn encode(message: &OutboundMessage) -> Option<Utf8Bytes> {
    match message.to_json() {
        Ok(json) => Some(json.into()),
        Err(e) => {
            tracing::warn!(
                kind = %message.kind(),
                error = %e,
                "Failed to serialize outbound message"
            );
            None
        }
    }
}

fn send_frame(registry: &ConnectionRegistry, user_id: &str, frame: &Utf8Bytes) -> bool {
    let Some(connection) = registry.lookup(user_id) else {
        tracing::debug!(user_id = %user_id, "Recipient not connected");
        return false;
    };

    if !connection.is_open() {
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection.id(),
            status = ?connection.status(),
            "Recipient channel not open"
        );
        return false;
    }

    connection.send(Message::Text(frame.clone()))
}
