pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use registry::ConnectionRegistry;

/// Sender half feeding a connection's writer task.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Identifies one accepted WebSocket, independent of who it authenticates as.
pub type ConnectionId = Uuid;

/// Close code sent to a channel replaced by a newer registration.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// Close code sent to every channel when the server stops.
pub const CLOSE_GOING_AWAY: u16 = 1001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closing,
    Closed,
}

impl ConnectionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }
}

/// Handle to one live channel.
///
/// Cloning is cheap and every clone observes the same status. The session
/// task that owns the socket drives status transitions; the registry and
/// router only read it.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: ConnectionSender,
    status: Arc<AtomicU8>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            status: Arc::new(AtomicU8::new(ConnectionStatus::Open.as_u8())),
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Current status. A channel whose writer has gone away is `Closed`
    /// whatever was last recorded.
    pub fn status(&self) -> ConnectionStatus {
        if self.sender.is_closed() {
            return ConnectionStatus::Closed;
        }
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    /// Queue a frame for the writer task. Returns false if the writer is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Mark the channel as closing and queue a close frame.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.set_status(ConnectionStatus::Closing);
        self.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_is_open() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        assert_eq!(conn.status(), ConnectionStatus::Open);
        assert!(conn.is_open());
    }

    #[test]
    fn test_dropped_writer_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        drop(rx);
        assert_eq!(conn.status(), ConnectionStatus::Closed);
        assert!(!conn.send(Message::Text("x".into())));
    }

    #[test]
    fn test_close_queues_frame_and_marks_closing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        let observer = conn.clone();

        assert!(conn.close(CLOSE_SUPERSEDED, "superseded"));
        assert_eq!(observer.status(), ConnectionStatus::Closing);

        match rx.try_recv() {
            Ok(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, CLOSE_SUPERSEDED);
                assert_eq!(frame.reason.as_str(), "superseded");
            }
            other => panic!("Expected close frame, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_ids_are_distinct() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = Connection::new(tx.clone());
        let b = Connection::new(tx);
        assert_ne!(a.id(), b.id());
    }
}
