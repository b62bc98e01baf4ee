//! Events delivered to client listeners.

use chatroom_core::Message;
use chrono::{DateTime, Utc};

/// Room activity: chat text and presence changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoomEvent {
    /// A `NORMAL` message, broadcast or private.
    Message(Message),
    /// Someone is present in the room, either newly joined or replayed on login.
    Joined {
        /// Join time carried by the message.
        at: DateTime<Utc>,
        /// Participant name.
        name: String,
    },
    /// Someone left the room.
    Left {
        /// Time the server announced the departure.
        at: DateTime<Utc>,
        /// Participant name.
        name: String,
    },
}

/// Login outcome and connection health.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginEvent {
    /// The server accepted our name.
    Successful,
    /// The name is taken; another HELLO may be sent.
    NameRejected,
    /// The connection failed. Reported at most once per client.
    ConnectionError,
}
