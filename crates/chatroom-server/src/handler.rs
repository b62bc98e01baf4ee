//! Per-connection protocol state machine.
//!
//! ```text
//! AwaitingHello ──HELLO (name free)──▶ Active
//!      │  ▲                              │
//!      │  └──HELLO (name taken)          │
//!      └──────── end of stream / error ──┴──▶ Terminated
//! ```
//!
//! Whatever ends the receive loop, the departure sequence runs: unregister,
//! announce `LEFT` to the remaining sessions, close the connection.

use std::sync::Arc;

use chatroom_core::{ChatError, Message, MessageType, Result, is_valid_name};
use futures::future::join_all;
use metrics::counter;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::metrics::{
    DELIVERY_FAILURES_TOTAL, MALFORMED_FRAMES_TOTAL, MESSAGES_ROUTED_TOTAL, MESSAGES_UNROUTABLE_TOTAL,
    NAMES_REJECTED_TOTAL,
};
use crate::registry::SessionRegistry;
use crate::session::Session;

/// Protocol state of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
    /// Connected, no name accepted yet.
    AwaitingHello,
    /// Registered under a name; chat messages are routed.
    Active,
    /// Receive loop finished and departure sequence done.
    Terminated,
}

/// Drives one session from accept to departure.
pub struct SessionHandler {
    session: Arc<Session>,
    registry: Arc<SessionRegistry>,
    state: HandlerState,
}

impl SessionHandler {
    /// Handler for a freshly accepted session.
    pub fn new(session: Arc<Session>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            session,
            registry,
            state: HandlerState::AwaitingHello,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Run the receive loop until the stream ends or fails, then depart.
    pub async fn run(mut self) -> HandlerState {
        let span = info_span!(
            "session",
            id = %self.session.id(),
            peer = %self.session.connection().peer_addr()
        );
        async move {
            info!("serving client");
            if let Err(e) = self.receive_loop().await {
                match e {
                    ChatError::MalformedFrame(ref reason) => {
                        counter!(MALFORMED_FRAMES_TOTAL).increment(1);
                        warn!(reason = %reason, "incorrect message format");
                    }
                    ref other => error!(error = %other, "network communication error"),
                }
            }
            self.depart().await;
            self.state
        }
        .instrument(span)
        .await
    }

    async fn receive_loop(&mut self) -> Result<()> {
        while let Some(message) = self.session.connection().receive().await? {
            self.dispatch(message).await?;
        }
        debug!("client closed the stream");
        Ok(())
    }

    /// Handle one decoded message. Errors returned here are fatal to this connection.
    async fn dispatch(&mut self, message: Message) -> Result<()> {
        match (self.state, message.kind()) {
            (HandlerState::AwaitingHello, MessageType::Hello) => self.handle_hello(&message).await,
            (HandlerState::Active, MessageType::Normal) => {
                self.route(&message).await;
                Ok(())
            }
            (state, kind) => {
                warn!(?state, %kind, message = %message, "unsupported message type in this state, ignoring");
                Ok(())
            }
        }
    }

    async fn handle_hello(&mut self, hello: &Message) -> Result<()> {
        let name = hello.from();
        let connection = self.session.connection();

        if !is_valid_name(name) {
            info!(name, "rejecting invalid name");
            return self.reject_name().await;
        }
        if !self.registry.try_register(&self.session, name, hello.timestamp()) {
            info!(name, "rejecting taken name");
            return self.reject_name().await;
        }

        info!(name, "accepting client");
        self.state = HandlerState::Active;
        connection
            .send(&Message::builder().kind(MessageType::LoginSuccessful).build())
            .await?;

        let others: Vec<Arc<Session>> = self
            .registry
            .snapshot_by_join_time()
            .into_iter()
            .filter(|s| !Arc::ptr_eq(s, &self.session))
            .collect();

        let joined = Message::builder().kind(MessageType::Joined).from(name).build();
        debug!(recipients = others.len(), "announcing presence to others");
        deliver(&others, &joined).await;

        debug!(count = others.len(), "replaying presence of others");
        for other in &others {
            let Some(identity) = other.identity() else {
                continue;
            };
            let replay = Message::builder()
                .timestamp(identity.joined_at)
                .kind(MessageType::Joined)
                .from(identity.name.as_str())
                .build();
            connection.send(&replay).await?;
        }
        Ok(())
    }

    async fn reject_name(&self) -> Result<()> {
        counter!(NAMES_REJECTED_TOTAL).increment(1);
        let rejected = Message::builder().kind(MessageType::RejectedUserName).build();
        self.session.connection().send(&rejected).await
    }

    async fn route(&self, message: &Message) {
        if message.is_broadcast() {
            let recipients = self.registry.snapshot();
            debug!(recipients = recipients.len(), "broadcasting message");
            counter!(MESSAGES_ROUTED_TOTAL, "route" => "broadcast").increment(1);
            deliver(&recipients, message).await;
            return;
        }

        match self.registry.lookup(message.to()) {
            Some(recipient) => {
                debug!(to = message.to(), "forwarding private message");
                counter!(MESSAGES_ROUTED_TOTAL, "route" => "private").increment(1);
                deliver(std::slice::from_ref(&recipient), message).await;
            }
            None => {
                counter!(MESSAGES_UNROUTABLE_TOTAL).increment(1);
                let err = ChatError::UnroutableMessage(message.to().to_string());
                debug!(error = %err, "dropping private message");
            }
        }
    }

    async fn depart(&mut self) {
        if let Some(name) = self.session.name() {
            let _ = self.registry.remove(name);
            info!(name, "client left");
            let left = Message::builder().kind(MessageType::Left).from(name).build();
            deliver(&self.registry.snapshot(), &left).await;
        }
        if let Err(e) = self.session.connection().close().await {
            error!(error = %e, "connection closing failure");
        }
        self.state = HandlerState::Terminated;
        info!("stopped serving client");
    }
}

/// Send `message` to every recipient concurrently. Failures are logged and
/// left for each recipient's own handler to notice.
async fn deliver(recipients: &[Arc<Session>], message: &Message) {
    let sends = recipients.iter().map(|recipient| async move {
        if let Err(e) = recipient.connection().send(message).await {
            counter!(DELIVERY_FAILURES_TOTAL).increment(1);
            warn!(recipient = %recipient, error = %e, "delivery failed");
        }
    });
    let _ = join_all(sends).await;
}
