use std::sync::Arc;

use crate::ws::protocol::InboundSink;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live channels keyed by authenticated user identity
    pub registry: Arc<ConnectionRegistry>,
    /// Hand-off queue for inbound messages the relay does not handle itself
    pub inbound_tx: InboundSink,
    /// Send a close frame to a channel when a newer one registers for the same user
    pub close_superseded: bool,
    /// Upper bound on a single inbound WebSocket message, in bytes
    pub max_message_bytes: usize,
    /// Bearer token required on /api/relay routes, if set
    pub api_token: Option<String>,
}
