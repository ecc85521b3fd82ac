//! JSON text-frame protocol spoken over the relay's WebSocket channels.
//!
//! Every frame is a JSON object carrying a string `type` tag. Frames are
//! decoded at the boundary into typed messages: known types get a concrete
//! variant, anything else with a valid tag is carried as an opaque
//! [`Payload`] and passed through untouched.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::ws::ConnectionId;

/// A JSON object with a string `type` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Validate that `value` is an object with a string `type` tag.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Object(map) => match map.get("type") {
                Some(Value::String(_)) => Ok(Self(map)),
                _ => Err(ProtocolError::MissingType),
            },
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// The `type` tag.
    pub fn kind(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Server-originated events with a fixed schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelayEvent {
    Ping,
    NewMessage {
        conversation_id: String,
        message: Value,
    },
    MessageRead {
        conversation_id: String,
        user_id: String,
    },
    Typing {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
}

impl RelayEvent {
    /// Wire tags of every variant, in declaration order.
    pub const KINDS: [&'static str; 4] = ["ping", "newMessage", "messageRead", "typing"];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::NewMessage { .. } => "newMessage",
            Self::MessageRead { .. } => "messageRead",
            Self::Typing { .. } => "typing",
        }
    }
}

/// Anything the router can deliver to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Built by the server itself.
    Event(RelayEvent),
    /// Application message of a known type. `event` is the validated view;
    /// `raw` is what goes on the wire, extra fields included.
    Checked { event: RelayEvent, raw: Payload },
    /// Application message of an unknown type.
    Passthrough(Payload),
}

impl Serialize for OutboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Event(event) => event.serialize(serializer),
            Self::Checked { raw, .. } | Self::Passthrough(raw) => raw.serialize(serializer),
        }
    }
}

impl OutboundMessage {
    /// Decode an application-supplied JSON value.
    ///
    /// Known tags must match their schema; unknown tags pass through as-is.
    /// Either way the object is delivered exactly as supplied.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let payload = Payload::from_value(value)?;
        if !RelayEvent::KINDS.contains(&payload.kind()) {
            return Ok(Self::Passthrough(payload));
        }

        match serde_json::from_value::<RelayEvent>(payload.clone().into_value()) {
            Ok(event) => Ok(Self::Checked {
                event,
                raw: payload,
            }),
            Err(e) => Err(ProtocolError::InvalidFields {
                kind: payload.kind().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// The validated event, when the message has a known type.
    pub fn event(&self) -> Option<&RelayEvent> {
        match self {
            Self::Event(event) | Self::Checked { event, .. } => Some(event),
            Self::Passthrough(_) => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Event(event) | Self::Checked { event, .. } => event.kind(),
            Self::Passthrough(payload) => payload.kind(),
        }
    }

    /// Serialize to the text of a single frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<RelayEvent> for OutboundMessage {
    fn from(event: RelayEvent) -> Self {
        Self::Event(event)
    }
}

/// Client-originated frames.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `{"type": "auth", "userId": "<identity>"}`
    Auth { user_id: String },
    /// Any other tagged object. Handed to collaborators outside the relay.
    Passthrough(Payload),
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let payload = Payload::from_value(value)?;

        if payload.kind() != "auth" {
            return Ok(Self::Passthrough(payload));
        }

        match payload.get("userId").and_then(Value::as_str) {
            Some(user_id) if !user_id.is_empty() => Ok(Self::Auth {
                user_id: user_id.to_string(),
            }),
            _ => Err(ProtocolError::InvalidAuth),
        }
    }
}

/// An inbound passthrough message handed off to collaborators.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub connection_id: ConnectionId,
    /// Identity the channel authenticated as, if it has.
    pub user_id: Option<String>,
    pub payload: Payload,
}

/// Sending half of the collaborator hand-off queue.
pub type InboundSink = mpsc::UnboundedSender<InboundEvent>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_auth() {
        let msg = InboundMessage::decode(r#"{"type":"auth","userId":"u1"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Auth {
                user_id: "u1".to_string()
            }
        );
    }

    #[test]
    fn test_decode_auth_rejects_missing_or_empty_user_id() {
        for text in [
            r#"{"type":"auth"}"#,
            r#"{"type":"auth","userId":""}"#,
            r#"{"type":"auth","userId":42}"#,
        ] {
            let err = InboundMessage::decode(text).unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidAuth), "{text}: {err}");
        }
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            InboundMessage::decode("not json").unwrap_err(),
            ProtocolError::Json(_)
        ));
        assert!(matches!(
            InboundMessage::decode("[1,2,3]").unwrap_err(),
            ProtocolError::NotAnObject
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"userId":"u1"}"#).unwrap_err(),
            ProtocolError::MissingType
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"type":7}"#).unwrap_err(),
            ProtocolError::MissingType
        ));
    }

    #[test]
    fn test_decode_unknown_type_passes_through() {
        let msg =
            InboundMessage::decode(r#"{"type":"chatMessage","text":"hi","conversationId":"c1"}"#)
                .unwrap();
        match msg {
            InboundMessage::Passthrough(payload) => {
                assert_eq!(payload.kind(), "chatMessage");
                assert_eq!(payload.get("text"), Some(&json!("hi")));
            }
            other => panic!("Expected passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_ping_serializes_to_bare_type_tag() {
        let msg = OutboundMessage::from(RelayEvent::Ping);
        assert_eq!(msg.to_json().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_known_event_uses_camel_case_fields() {
        let msg = OutboundMessage::from(RelayEvent::Typing {
            conversation_id: "c1".to_string(),
            user_id: "u2".to_string(),
            is_typing: true,
        });
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "typing", "conversationId": "c1", "userId": "u2", "isTyping": true})
        );
    }

    #[test]
    fn test_outbound_from_value_recognizes_known_kinds() {
        let msg = OutboundMessage::from_value(json!({
            "type": "newMessage",
            "conversationId": "c1",
            "message": {"text": "hello", "sender": "u1"}
        }))
        .unwrap();
        assert_eq!(msg.kind(), "newMessage");
        assert!(matches!(
            msg.event(),
            Some(RelayEvent::NewMessage { conversation_id, .. }) if conversation_id == "c1"
        ));
    }

    #[test]
    fn test_outbound_from_value_rejects_bad_known_fields() {
        let err = OutboundMessage::from_value(json!({"type": "messageRead", "conversationId": 5}))
            .unwrap_err();
        match err {
            ProtocolError::InvalidFields { kind, .. } => assert_eq!(kind, "messageRead"),
            other => panic!("Expected InvalidFields, got {:?}", other),
        }
    }

    #[test]
    fn test_known_kind_keeps_extra_fields_on_the_wire() {
        let original = json!({
            "type": "newMessage",
            "conversationId": "c1",
            "message": {"t": "hi"},
            "tempId": "x9",
            "senderId": "u1"
        });
        let msg = OutboundMessage::from_value(original.clone()).unwrap();
        assert!(matches!(msg.event(), Some(RelayEvent::NewMessage { .. })));

        let reparsed: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, original);

        let ping = OutboundMessage::from_value(json!({"type": "ping", "ts": 123})).unwrap();
        assert_eq!(ping.kind(), "ping");
        let reparsed: Value = serde_json::from_str(&ping.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, json!({"type": "ping", "ts": 123}));
    }

    #[test]
    fn test_passthrough_is_forwarded_verbatim() {
        let original = json!({"type": "friendRequest", "from": "u9", "meta": {"n": 1}});
        let msg = OutboundMessage::from_value(original.clone()).unwrap();
        assert_eq!(msg.kind(), "friendRequest");
        let reparsed: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, original);
    }
}
