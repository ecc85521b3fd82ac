//! REST endpoints through which the application layer hands messages to the relay.
//!
//! These are thin wrappers over [`crate::ws::broadcast`]: the body is validated
//! as an outbound message at the boundary, then delivered best-effort to
//! whichever channels are currently registered.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::middleware::RelayCaller;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::OutboundMessage;
use crate::ws::registry::RegisteredConnection;

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<RegisteredConnection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub participants: Vec<String>,
    #[serde(default)]
    pub exclude_user_id: Option<String>,
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

/// GET /api/relay/connections — Registered identities and their channels.
pub async fn list_connections(
    State(state): State<AppState>,
    _caller: RelayCaller,
) -> Json<ConnectionsResponse> {
    let connections = state.registry.snapshot();
    Json(ConnectionsResponse {
        count: connections.len(),
        connections,
    })
}

/// POST /api/relay/users/{user_id}/messages — Deliver one message to one user.
/// Body: an outbound message object with a string `type`.
pub async fn send_to_user(
    State(state): State<AppState>,
    _caller: RelayCaller,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<SendResponse>, StatusCode> {
    let message = decode_outbound(body)?;
    let delivered = broadcast::send_to_user(&state.registry, &user_id, &message);
    Ok(Json(SendResponse { delivered }))
}

/// POST /api/relay/conversations/{conversation_id}/messages — Deliver to every
/// participant except the optional excluded one.
/// Body: { "participants": [..], "excludeUserId"?: "..", "payload": {..} }
pub async fn broadcast_to_conversation(
    State(state): State<AppState>,
    _caller: RelayCaller,
    Path(conversation_id): Path<String>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, StatusCode> {
    let message = decode_outbound(body.payload)?;
    let delivered = broadcast::broadcast_to_conversation(
        &state.registry,
        &conversation_id,
        &body.participants,
        &message,
        body.exclude_user_id.as_deref(),
    );
    Ok(Json(BroadcastResponse { delivered }))
}

fn decode_outbound(value: Value) -> Result<OutboundMessage, StatusCode> {
    OutboundMessage::from_value(value).map_err(|e| {
        tracing::debug!(error = %e, "Rejected outbound message");
        StatusCode::BAD_REQUEST
    })
}
