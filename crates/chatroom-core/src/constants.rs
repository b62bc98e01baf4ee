//! Protocol constants shared by server and client.

/// Default TCP port the server listens on and the client connects to.
pub const DEFAULT_PORT: u16 = 22222;

/// Number of newline-terminated fields in one frame.
pub const FIELD_COUNT: usize = 5;

/// Default upper bound for a single frame line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;
