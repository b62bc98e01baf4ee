//! # chatroom-client
//!
//! Client side of the chat protocol. A [`ChatClient`] owns one connection
//! and two tasks:
//!
//! - **inbound**: decodes frames and fans them out to registered listeners
//! - **outbound**: drains the command queue onto the connection
//!
//! Presentation code talks to the client through the command surface
//! (`send_hello`, `send_broadcast`, `send_private`, `leave`) and receives
//! [`RoomEvent`]s and [`LoginEvent`]s through listeners. A [`Roster`] of
//! present names is kept up to date from the same events.

#![deny(unsafe_code)]

pub mod client;
pub mod events;
mod inbound;
pub mod listeners;
mod outbound;
pub mod roster;

pub use client::ChatClient;
pub use events::{LoginEvent, RoomEvent};
pub use listeners::{ListenerId, ListenerSet};
pub use roster::Roster;
