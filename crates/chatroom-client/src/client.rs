//! Command surface and task ownership for one client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chatroom_core::constants::DEFAULT_MAX_LINE_LENGTH;
use chatroom_core::{BROADCAST, ChatError, Connection, Message, MessageType, Result, is_valid_name};
use parking_lot::Mutex;
use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::events::{LoginEvent, RoomEvent};
use crate::listeners::{ListenerId, ListenerSet};
use crate::outbound::Outbound;
use crate::roster::Roster;
use crate::{inbound, outbound};

/// State shared by the command surface and both connection tasks.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) connection: Connection,
    pub(crate) room: ListenerSet<RoomEvent>,
    pub(crate) login: ListenerSet<LoginEvent>,
    pub(crate) roster: Roster,
    /// Name sent with the most recent HELLO.
    name: Mutex<Option<String>>,
    leaving: AtomicBool,
    logged_in: AtomicBool,
    error_reported: AtomicBool,
}

impl Shared {
    pub(crate) fn new(connection: Connection) -> Self {
        Self {
            connection,
            room: ListenerSet::new(),
            login: ListenerSet::new(),
            roster: Roster::new(),
            name: Mutex::new(None),
            leaving: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            error_reported: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_leaving(&self) {
        self.leaving.store(true, Ordering::Release);
    }

    pub(crate) fn is_leaving(&self) -> bool {
        self.leaving.load(Ordering::Acquire)
    }

    /// Record the accepted login and put our own name on the roster.
    pub(crate) fn set_logged_in(&self) {
        if let Some(name) = self.name.lock().as_deref() {
            self.roster.insert(name);
        }
        self.logged_in.store(true, Ordering::Release);
    }

    /// Notify login listeners of a connection failure, once per client.
    pub(crate) fn report_connection_error(&self) {
        if !self.error_reported.swap(true, Ordering::AcqRel) {
            self.login.emit(&LoginEvent::ConnectionError);
        }
    }
}

/// A connected chat client.
///
/// Dropping the client without calling [`shutdown`](Self::shutdown) closes
/// the command queue, which makes the outbound task flush and close.
#[derive(Debug)]
pub struct ChatClient {
    shared: Arc<Shared>,
    queue: UnboundedSender<Outbound>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl ChatClient {
    /// Connect to a server and start the inbound and outbound tasks.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        Self::connect_with(addr, DEFAULT_MAX_LINE_LENGTH).await
    }

    /// Connect with an explicit per-line frame limit.
    pub async fn connect_with(addr: impl ToSocketAddrs, max_line_length: usize) -> Result<Self> {
        let stream = tokio::net::TcpStream::connect(addr).await?;
        let connection = Connection::with_max_line_length(stream, max_line_length)?;
        info!(server = %connection.peer_addr(), "connected");

        let shared = Arc::new(Shared::new(connection));
        let (queue, rx) = mpsc::unbounded_channel();
        let inbound = tokio::spawn(inbound::run(Arc::clone(&shared)));
        let outbound = tokio::spawn(outbound::run(Arc::clone(&shared), rx));
        Ok(Self {
            shared,
            queue,
            inbound,
            outbound,
        })
    }

    /// Ask to join under `name`. The answer arrives as a [`LoginEvent`].
    ///
    /// May be repeated after [`LoginEvent::NameRejected`].
    pub fn send_hello(&self, name: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(ChatError::InvalidName(name.to_string()));
        }
        *self.shared.name.lock() = Some(name.to_string());
        self.enqueue(Message::builder().kind(MessageType::Hello).from(name).build())
    }

    /// Send `text` to everyone in the room, ourselves included.
    pub fn send_broadcast(&self, text: &str) -> Result<()> {
        self.send_text(BROADCAST, text)
    }

    /// Send `text` to the participant named `to` only.
    pub fn send_private(&self, to: &str, text: &str) -> Result<()> {
        if has_line_break(to) {
            return Err(ChatError::InvalidName(to.to_string()));
        }
        self.send_text(to, text)
    }

    fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if has_line_break(text) {
            return Err(ChatError::MalformedFrame("text contains a line break".into()));
        }
        let from = self.shared.name.lock().clone().unwrap_or_default();
        self.enqueue(Message::builder().from(from).to(to).text(text).build())
    }

    fn enqueue(&self, message: Message) -> Result<()> {
        self.queue
            .send(Outbound::Send(message))
            .map_err(|_| ChatError::Disconnected)
    }

    /// Leave the room.
    ///
    /// Stops the inbound task immediately; messages queued before this call
    /// are still written before the connection closes. No connection-error
    /// event is reported for a requested leave.
    pub fn leave(&self) {
        self.shared.mark_leaving();
        self.shared.connection.shutdown_read();
        if self.queue.send(Outbound::Leave).is_err() {
            debug!("outbound task already stopped");
        }
    }

    /// Leave and wait for both connection tasks to finish.
    pub async fn shutdown(self) {
        self.leave();
        let _ = self.inbound.await;
        let _ = self.outbound.await;
    }

    /// Register a room listener.
    pub fn add_room_listener(&self, listener: impl Fn(&RoomEvent) + Send + Sync + 'static) -> ListenerId {
        self.shared.room.add(listener)
    }

    /// Remove a room listener. Returns whether it was registered.
    pub fn remove_room_listener(&self, id: ListenerId) -> bool {
        self.shared.room.remove(id)
    }

    /// Register a login listener.
    pub fn add_login_listener(&self, listener: impl Fn(&LoginEvent) + Send + Sync + 'static) -> ListenerId {
        self.shared.login.add(listener)
    }

    /// Remove a login listener. Returns whether it was registered.
    pub fn remove_login_listener(&self, id: ListenerId) -> bool {
        self.shared.login.remove(id)
    }

    /// Name sent with the most recent HELLO.
    pub fn name(&self) -> Option<String> {
        self.shared.name.lock().clone()
    }

    /// Names currently in the room, ourselves included once logged in, sorted.
    pub fn roster(&self) -> Vec<String> {
        self.shared.roster.names()
    }

    /// Whether the server has accepted our name.
    pub fn is_logged_in(&self) -> bool {
        self.shared.logged_in.load(Ordering::Acquire)
    }

    /// Server address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.connection.peer_addr()
    }

    /// Resolves once the connection has been closed, for any reason.
    pub async fn closed(&self) {
        self.shared.connection.closed().await;
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\n', '\r'])
}
