//! # chatroom-core
//!
//! Shared protocol vocabulary for the chat room server and client.
//!
//! - **Messages**: [`message::Message`] immutable value built via [`message::MessageBuilder`]
//! - **Wire codec**: [`codec::MessageCodec`], five newline-terminated fields per frame
//! - **Transport**: [`connection::Connection`], one framed TCP stream with half-close support
//! - **Errors**: [`errors::ChatError`] taxonomy via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for binaries
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by the server, client and binary crates.

#![deny(unsafe_code)]

pub mod codec;
pub mod connection;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod message;

pub use codec::MessageCodec;
pub use connection::Connection;
pub use errors::{ChatError, Result};
pub use message::{BROADCAST, Message, MessageBuilder, MessageType, is_valid_name};
