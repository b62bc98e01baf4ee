//! # chatroom-server
//!
//! Chat room server: accepts TCP connections and runs one [`handler::SessionHandler`]
//! task per connection.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `session` | Per-connection identity: name, join time, owned connection |
//! | `registry` | Process-wide name → session map with atomic registration |
//! | `handler` | Receive loop, HELLO/NORMAL dispatch, join/leave announcements |
//! | `server` | Listener, accept loop, connection limit, shutdown |
//! | `metrics` | Metric names and Prometheus recorder |
//!
//! ## Data Flow
//!
//! accepted socket → `Connection` → `SessionHandler` → `SessionRegistry`
//! lookups/snapshots → other sessions' connections.

#![deny(unsafe_code)]

pub mod handler;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod session;

pub use handler::{HandlerState, SessionHandler};
pub use registry::SessionRegistry;
pub use server::{ChatServer, ServerConfig};
pub use session::{Identity, Session};
