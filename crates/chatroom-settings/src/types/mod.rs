//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Each type implements
//! [`Default`] with production values, and `#[serde(default)]` lets a
//! settings file name only the fields it changes.

use chatroom_core::constants::{DEFAULT_MAX_LINE_LENGTH, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Smallest accepted frame line limit. Must fit a timestamp and any type name.
pub const MIN_LINE_LENGTH: usize = 64;

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Server listener settings.
    pub server: ServerSettings,
    /// Client connection settings.
    pub client: ClientSettings,
    /// Wire protocol limits.
    pub protocol: ProtocolSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl ChatSettings {
    /// Correct invalid values in place, warning about each correction.
    pub fn validate(&mut self) {
        if self.server.max_connections == Some(0) {
            tracing::warn!("maxConnections 0 would refuse everyone, removing the limit");
            self.server.max_connections = None;
        }
        if self.protocol.max_line_length < MIN_LINE_LENGTH {
            tracing::warn!(
                "maxLineLength {} below minimum, raised to {MIN_LINE_LENGTH}",
                self.protocol.max_line_length
            );
            self.protocol.max_line_length = MIN_LINE_LENGTH;
        }
    }
}

/// Server listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Interface to bind.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Upper bound on concurrently served connections. `None` means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: None,
        }
    }
}

impl ServerSettings {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Port used when the command line gives only a host.
    pub server_port: u16,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
        }
    }
}

/// Wire protocol limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// Maximum bytes in one frame line.
    pub max_line_length: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
