//! Connection registry: identities and lifetimes of input-context connections.
//!
//! Every accepted peer is registered here and receives a [`ConnectionId`].
//! Identities come from a plain counter starting at 0; they are never reused,
//! so a stale id held by some other component can never alias a newer peer.
//!
//! # Ownership (for beginners)
//!
//! The registry is the only owner of a [`Connection`]. Everything else (the
//! active-context selector, toolbar ids, the widget state store) refers to a
//! connection by its `ConnectionId`, a copyable number. Removing the entry
//! here is what ends the connection's life in the broker.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::channel::ContextChannel;

/// Identity of one input-context connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered input-context connection.
pub struct Connection {
    pub id: ConnectionId,
    /// Outbound call channel.
    pub channel: Arc<dyn ContextChannel>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish_non_exhaustive()
    }
}

/// All live connections, keyed by identity.
///
/// A `BTreeMap` keeps [`ids`](Self::ids) in acceptance order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its new identity.
    pub fn register(&mut self, channel: Arc<dyn ContextChannel>) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(id, Connection { id, channel });
        id
    }

    /// Removes a connection. Returns `None` if it was already removed.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Live identities in acceptance order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Removes every connection, e.g. on shutdown.
    pub fn drain(&mut self) -> Vec<Connection> {
        std::mem::take(&mut self.connections).into_values().collect()
    }
}
