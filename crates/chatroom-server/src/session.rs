//! Per-connection session state.

use std::fmt;
use std::sync::OnceLock;

use chatroom_core::Connection;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Name and join time, assigned once when a HELLO is accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Unique display name.
    pub name: String,
    /// Join time taken from the accepted HELLO; orders presence replay.
    pub joined_at: DateTime<Utc>,
}

/// One connected participant.
///
/// Created on accept without an identity. The identity is set exactly once,
/// by [`SessionRegistry::try_register`](crate::registry::SessionRegistry::try_register).
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    connection: Connection,
    identity: OnceLock<Identity>,
}

impl Session {
    /// Wrap a freshly accepted connection.
    pub fn new(connection: Connection) -> Self {
        Self {
            id: Uuid::now_v7(),
            connection,
            identity: OnceLock::new(),
        }
    }

    /// Opaque id for logging; stable for the session's lifetime.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The owned transport.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Identity, if a HELLO has been accepted.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// Registered name, if any.
    pub fn name(&self) -> Option<&str> {
        self.identity().map(|i| i.name.as_str())
    }

    /// Join time, if registered.
    pub fn joined_at(&self) -> Option<DateTime<Utc>> {
        self.identity().map(|i| i.joined_at)
    }

    /// Assign the identity. Returns `false` if one was already assigned.
    pub(crate) fn assign_identity(&self, identity: Identity) -> bool {
        self.identity.set(identity).is_ok()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}@{}", self.connection.peer_addr()),
            None => write!(f, "<anonymous>@{}", self.connection.peer_addr()),
        }
    }
}
