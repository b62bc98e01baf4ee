//! Chat message value type.
//!
//! A [`Message`] is immutable once built. Timestamps are kept at millisecond
//! precision so that a message survives a trip through the wire codec
//! unchanged.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};

/// Reserved destination meaning "deliver to every current session".
pub const BROADCAST: &str = "!BROADCAST";

/// Whether `name` can identify a participant: non-empty, single-line and
/// not the [`BROADCAST`] sentinel.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != BROADCAST && !name.contains(['\n', '\r'])
}

/// Kind of a message, written on the wire by its literal name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Chat text, broadcast or private.
    Normal,
    /// Client asks to join under the name in `from`.
    Hello,
    /// Someone named in `from` is present in the room.
    Joined,
    /// Someone named in `from` left the room.
    Left,
    /// The server accepted the client's name.
    LoginSuccessful,
    /// The server rejected the client's name because it is taken.
    RejectedUserName,
}

impl MessageType {
    /// All message types, in wire declaration order.
    pub const ALL: [Self; 6] = [
        Self::Normal,
        Self::Hello,
        Self::Joined,
        Self::Left,
        Self::LoginSuccessful,
        Self::RejectedUserName,
    ];

    /// Literal name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Hello => "HELLO",
            Self::Joined => "JOINED",
            Self::Left => "LEFT",
            Self::LoginSuccessful => "LOGIN_SUCCESSFUL",
            Self::RejectedUserName => "REJECTED_USER_NAME",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a type token is not one of the six literal names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized message type {0:?}")]
pub struct UnknownMessageType(pub String);

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMessageType(s.to_string()))
    }
}

/// One chat protocol message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    timestamp: DateTime<Utc>,
    kind: MessageType,
    from: String,
    to: String,
    text: String,
}

impl Message {
    /// Start building a message with protocol defaults.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// When the message was authored.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Message kind.
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Author name. Empty for server-originated control messages.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Destination name, or [`BROADCAST`].
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Payload text. Empty for control messages.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the destination is the broadcast sentinel.
    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} from={:?} to={:?} text={:?}]",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.kind,
            self.from,
            self.to,
            self.text
        )
    }
}

/// Builder for [`Message`].
///
/// Defaults: `timestamp = now`, `kind = NORMAL`, `from = to = text = ""`.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    timestamp: DateTime<Utc>,
    kind: MessageType,
    from: String,
    to: String,
    text: String,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(3),
            kind: MessageType::Normal,
            from: String::new(),
            to: String::new(),
            text: String::new(),
        }
    }
}

impl MessageBuilder {
    /// Set the authoring time. Sub-millisecond precision is dropped.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }

    /// Set the message kind.
    pub fn kind(mut self, kind: MessageType) -> Self {
        self.kind = kind;
        self
    }

    /// Set the author name.
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Set the destination name.
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Address the message to every current session.
    pub fn broadcast(self) -> Self {
        self.to(BROADCAST)
    }

    /// Set the payload text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Finish building.
    pub fn build(self) -> Message {
        Message {
            timestamp: self.timestamp,
            kind: self.kind,
            from: self.from,
            to: self.to,
            text: self.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn names_the_protocol_cannot_carry_are_invalid() {
        assert!(is_valid_name("alice"));
        assert!(is_valid_name("Alice Smith"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(BROADCAST));
        assert!(!is_valid_name("al\nice"));
        assert!(!is_valid_name("alice\r"));
    }

    #[test]
    fn builder_defaults() {
        let before = Utc::now().trunc_subsecs(3);
        let msg = Message::builder().build();
        let after = Utc::now();
        assert_eq!(msg.kind(), MessageType::Normal);
        assert_eq!(msg.from(), "");
        assert_eq!(msg.to(), "");
        assert_eq!(msg.text(), "");
        assert!(msg.timestamp() >= before && msg.timestamp() <= after);
        assert!(!msg.is_broadcast());
    }

    #[test]
    fn default_timestamp_has_millisecond_precision() {
        let msg = Message::builder().build();
        assert_eq!(msg.timestamp().nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn explicit_timestamp_is_truncated() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let msg = Message::builder().timestamp(ts).build();
        assert_eq!(msg.timestamp().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn broadcast_sentinel() {
        let msg = Message::builder().from("alice").broadcast().text("hi").build();
        assert!(msg.is_broadcast());
        assert_eq!(msg.to(), BROADCAST);

        let private = Message::builder().from("alice").to("bob").build();
        assert!(!private.is_broadcast());
    }

    #[test]
    fn type_names_parse_back() {
        for kind in MessageType::ALL {
            assert_eq!(kind.as_str().parse::<MessageType>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_type_name_rejected() {
        let err = "GOODBYE".parse::<MessageType>().unwrap_err();
        assert_eq!(err, UnknownMessageType("GOODBYE".into()));
        assert!("normal".parse::<MessageType>().is_err());
    }

    #[test]
    fn display_is_readable() {
        let ts = Utc.timestamp_millis_opt(0).unwrap();
        let msg = Message::builder()
            .timestamp(ts)
            .kind(MessageType::Joined)
            .from("bob")
            .build();
        assert_eq!(
            msg.to_string(),
            "[1970-01-01T00:00:00.000Z JOINED from=\"bob\" to=\"\" text=\"\"]"
        );
    }
}
