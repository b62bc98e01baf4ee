//! TCP listener and accept loop.
//!
//! Each accepted socket gets its own task running a [`SessionHandler`].
//! With a connection limit configured, the loop waits for a free slot
//! before accepting the next socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatroom_core::constants::DEFAULT_MAX_LINE_LENGTH;
use chatroom_core::{Connection, Result};
use chatroom_settings::ChatSettings;
use metrics::counter;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::handler::SessionHandler;
use crate::metrics::{CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL};
use crate::registry::SessionRegistry;
use crate::session::Session;

/// Back-off after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server tuning independent of the bind address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Upper bound on concurrently served connections.
    pub max_connections: Option<usize>,
    /// Maximum bytes per frame line.
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Extract server tuning from loaded settings.
    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self {
            max_connections: settings.server.max_connections,
            max_line_length: settings.protocol.max_line_length,
        }
    }
}

/// Bound chat server, ready to [`run`](ChatServer::run).
#[derive(Debug)]
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
    slots: Option<Arc<Semaphore>>,
}

impl ChatServer {
    /// Bind the listener.
    pub async fn bind(addr: impl ToSocketAddrs, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let slots = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        Ok(Self {
            listener,
            registry: Arc::new(SessionRegistry::new()),
            config,
            slots,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry of this server.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Sessions already being served keep running after the loop stops.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(addr = %self.local_addr()?, "waiting for clients");
        loop {
            let permit = match self.acquire_slot(&shutdown).await {
                Slot::Granted(permit) => permit,
                Slot::Shutdown => break,
            };

            let accepted = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    counter!(CONNECTIONS_TOTAL).increment(1);
                    let registry = Arc::clone(&self.registry);
                    let max_line_length = self.config.max_line_length;
                    let _ = tokio::spawn(async move {
                        serve(stream, addr, registry, max_line_length).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
        info!("accept loop stopped");
        Ok(())
    }

    async fn acquire_slot(&self, shutdown: &CancellationToken) -> Slot {
        let Some(slots) = &self.slots else {
            return Slot::Granted(None);
        };
        if slots.available_permits() == 0 {
            warn!(
                max = self.config.max_connections,
                "connection limit reached, waiting for a free slot"
            );
        }
        tokio::select! {
            biased;
            () = shutdown.cancelled() => Slot::Shutdown,
            permit = Arc::clone(slots).acquire_owned() => match permit {
                Ok(permit) => Slot::Granted(Some(permit)),
                Err(_) => Slot::Shutdown,
            },
        }
    }
}

enum Slot {
    Granted(Option<OwnedSemaphorePermit>),
    Shutdown,
}

async fn serve(stream: TcpStream, addr: SocketAddr, registry: Arc<SessionRegistry>, max_line_length: usize) {
    let connection = match Connection::with_max_line_length(stream, max_line_length) {
        Ok(connection) => connection,
        Err(e) => {
            warn!(peer = %addr, error = %e, "could not set up connection");
            return;
        }
    };
    let session = Arc::new(Session::new(connection));
    let _ = SessionHandler::new(session, registry).run().await;
    counter!(DISCONNECTIONS_TOTAL).increment(1);
}
