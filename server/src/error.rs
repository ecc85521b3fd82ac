//! Error types shared across the relay.

/// Failure to decode a wire payload into a typed message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Payload parsed but is not a JSON object.
    #[error("payload must be a JSON object")]
    NotAnObject,
    /// Object has no string `type` field.
    #[error("payload is missing a string `type` field")]
    MissingType,
    /// `auth` message without a usable `userId`.
    #[error("auth message requires a non-empty string `userId`")]
    InvalidAuth,
    /// A known message type whose fields do not match its schema.
    #[error("invalid `{kind}` message: {reason}")]
    InvalidFields {
        /// The `type` tag of the rejected message.
        kind: String,
        /// Decoder error description.
        reason: String,
    },
}
