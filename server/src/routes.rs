use axum::{routing::get, routing::post, Router};

use crate::relay;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // Relay API used by the application layer (bearer token checked per handler)
    let relay_routes = Router::new()
        .route("/api/relay/connections", get(relay::list_connections))
        .route(
            "/api/relay/users/{user_id}/messages",
            post(relay::send_to_user),
        )
        .route(
            "/api/relay/conversations/{conversation_id}/messages",
            post(relay::broadcast_to_conversation),
        );

    // WebSocket endpoint (identity is established in-band with an auth frame)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(relay_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
