use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::{Connection, ConnectionId};

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredConnection {
    pub user_id: String,
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
}

/// Maps each authenticated user identity to its live channel.
///
/// Holds at most one connection per identity: a later registration replaces
/// the earlier one. Per-key operations on the underlying DashMap are atomic,
/// so "last registration wins" and "remove only the matching channel" hold
/// across worker threads without an outer lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `user_id`.
    ///
    /// Returns the superseded connection when a different channel was
    /// registered for this identity. The superseded channel is not touched;
    /// closing it is the caller's decision.
    pub fn register(&self, user_id: &str, connection: Connection) -> Option<Connection> {
        let connection_id = connection.id();
        let previous = self.entries.insert(user_id.to_string(), connection);

        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            replaced = previous.is_some(),
            "Connection registered"
        );

        previous.filter(|prev| prev.id() != connection_id)
    }

    /// Remove whichever entry currently refers to `connection`.
    ///
    /// Returns false if the channel was never registered or has already been
    /// superseded; a newer registration for the same identity is left alone.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let connection_id = connection.id();
        let user_id = self
            .entries
            .iter()
            .find(|entry| entry.value().id() == connection_id)
            .map(|entry| entry.key().clone());

        let Some(user_id) = user_id else {
            return false;
        };

        // Re-check under the shard lock: the identity may have been
        // re-registered between the scan and the removal.
        let removed = self
            .entries
            .remove_if(&user_id, |_, current| current.id() == connection_id)
            .is_some();

        if removed {
            tracing::debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Connection unregistered"
            );
        }
        removed
    }

    pub fn lookup(&self, user_id: &str) -> Option<Connection> {
        self.entries.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All current entries, sorted by user identity.
    pub fn snapshot(&self) -> Vec<RegisteredConnection> {
        let mut entries: Vec<RegisteredConnection> = self
            .entries
            .iter()
            .map(|entry| RegisteredConnection {
                user_id: entry.key().clone(),
                connection_id: entry.value().id(),
                connected_at: entry.value().connected_at(),
            })
            .collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        entries
    }

    /// Send a close frame to every registered channel. Entries are removed by
    /// each session as its socket shuts down. Returns how many frames were queued.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let connections: Vec<Connection> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        connections
            .iter()
            .filter(|conn| conn.close(code, reason))
            .count()
    }
}
