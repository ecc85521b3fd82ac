use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};

use crate::state::AppState;

/// Caller of the /api/relay routes.
///
/// When the server is configured with an API token the request must carry
/// `Authorization: Bearer <token>`; otherwise every caller is accepted.
/// Use as an extractor in handler signatures.
#[derive(Debug, Clone, Copy)]
pub struct RelayCaller;

impl FromRequestParts<AppState> for RelayCaller {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.api_token.as_deref() else {
            return Ok(RelayCaller);
        };

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if token != expected {
            tracing::warn!("Rejected relay API call with wrong token");
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(RelayCaller)
    }
}
