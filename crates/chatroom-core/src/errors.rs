//! Error taxonomy for the chat protocol.
//!
//! | Variant | Fatal to | Surfaced as |
//! |---------|----------|-------------|
//! | `Transport` | owning connection | departure / connection-error callback |
//! | `MalformedFrame` | owning receive loop | departure / connection-error callback |
//! | `NameConflict` | nothing | `REJECTED_USER_NAME` to the requester |
//! | `UnroutableMessage` | nothing | dropped, logged only |
//! | `InvalidName` | caller's command | error returned from `send_hello` |
//! | `Disconnected` | caller's command | error returned from the command surface |

use tokio_util::codec::LinesCodecError;

/// Errors produced by the codec, transport and session layers.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Socket I/O failure, including writes after the output side was shut down.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer sent a frame that cannot be decoded, or a field cannot be framed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Requested display name is already registered.
    #[error("name already taken: {0}")]
    NameConflict(String),

    /// Private message destination is not currently registered.
    #[error("no participant named {0:?}")]
    UnroutableMessage(String),

    /// A display name the protocol cannot carry: empty, multi-line or reserved.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The connection's execution units have stopped; commands can no longer be queued.
    #[error("not connected")]
    Disconnected,
}

impl ChatError {
    /// Build a transport error for a write attempted after the write side was shut down.
    pub fn write_shut_down() -> Self {
        Self::Transport(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "write side has been shut down",
        ))
    }

    /// Whether this error ends the owning connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedFrame(_))
    }
}

impl From<LinesCodecError> for ChatError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                Self::MalformedFrame("line exceeds maximum length".into())
            }
            LinesCodecError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Self::MalformedFrame(format!("undecodable line: {e}"))
            }
            LinesCodecError::Io(e) => Self::Transport(e),
        }
    }
}

/// Convenience alias used throughout the chat crates.
pub type Result<T> = std::result::Result<T, ChatError>;
