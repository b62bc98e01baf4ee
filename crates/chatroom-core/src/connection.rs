//! Framed transport over one TCP stream.
//!
//! A [`Connection`] exclusively owns its socket. The read and write halves
//! are locked independently so one task can sit in [`Connection::receive`]
//! while others [`Connection::send`]. Each `send` writes and flushes one
//! whole frame under the write lock, so concurrent senders never interleave.
//!
//! ## Shutdown
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `shutdown_read` | pending and future `receive` calls return `Ok(None)` |
//! | `shutdown_write` | sends FIN; later `send` calls fail, `try_send` returns `false` |
//! | `close` | both of the above, then releases the socket |

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::MessageCodec;
use crate::constants::DEFAULT_MAX_LINE_LENGTH;
use crate::errors::{ChatError, Result};
use crate::message::Message;

/// One bidirectional chat stream.
#[derive(Debug)]
pub struct Connection {
    peer: SocketAddr,
    reader: Mutex<Option<FramedRead<OwnedReadHalf, MessageCodec>>>,
    /// Write half; `None` once the output side has been shut down.
    ///
    /// Holding this lock is the exclusion region between "check writable,
    /// then send" and "close".
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, MessageCodec>>>,
    writable: AtomicBool,
    read_shutdown: CancellationToken,
    closed: CancellationToken,
}

impl Connection {
    /// Wrap an accepted or connected stream using the default line limit.
    pub fn new(stream: TcpStream) -> Result<Self> {
        Self::with_max_line_length(stream, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Wrap a stream, bounding each frame line to `max_line_length` bytes.
    pub fn with_max_line_length(stream: TcpStream, max_line_length: usize) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            peer,
            reader: Mutex::new(Some(FramedRead::new(
                read_half,
                MessageCodec::with_max_line_length(max_line_length),
            ))),
            writer: Mutex::new(Some(FramedWrite::new(
                write_half,
                MessageCodec::with_max_line_length(max_line_length),
            ))),
            writable: AtomicBool::new(true),
            read_shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
        })
    }

    /// Open a connection to a chat server.
    pub async fn connect(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream)
    }

    /// Remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next complete frame.
    ///
    /// Returns `Ok(None)` on clean end of stream or after [`shutdown_read`](Self::shutdown_read).
    pub async fn receive(&self) -> Result<Option<Message>> {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Ok(None);
        };
        tokio::select! {
            biased;
            () = self.read_shutdown.cancelled() => Ok(None),
            frame = reader.next() => {
                let message = frame.transpose()?;
                if let Some(ref m) = message {
                    trace!(peer = %self.peer, message = %m, "frame received");
                }
                Ok(message)
            }
        }
    }

    /// Write one frame and flush it.
    ///
    /// Fails with a transport error if the output side is shut down.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if self.try_send(message).await? {
            Ok(())
        } else {
            Err(ChatError::write_shut_down())
        }
    }

    /// Send only if the write side is still open, atomically with respect to
    /// [`shutdown_write`](Self::shutdown_write) and [`close`](Self::close).
    ///
    /// Returns `Ok(false)` without writing when the output side is already shut down.
    pub async fn try_send(&self, message: &Message) -> Result<bool> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Ok(false);
        };
        trace!(peer = %self.peer, message = %message, "sending frame");
        writer.send(message).await?;
        Ok(true)
    }

    /// Half-close the output side. Idempotent.
    pub async fn shutdown_write(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();
        self.writable.store(false, Ordering::Release);
        if let Some(writer) = writer {
            debug!(peer = %self.peer, "shutting down write side");
            let mut half = writer.into_inner();
            half.shutdown().await?;
        }
        Ok(())
    }

    /// Half-close the input side, unblocking a pending [`receive`](Self::receive). Idempotent.
    pub fn shutdown_read(&self) {
        if !self.read_shutdown.is_cancelled() {
            debug!(peer = %self.peer, "shutting down read side");
            self.read_shutdown.cancel();
        }
    }

    /// Shut down both directions and release the socket. Safe to call repeatedly.
    pub async fn close(&self) -> Result<()> {
        self.shutdown_read();
        let result = self.shutdown_write().await;
        drop(self.reader.lock().await.take());
        if !self.closed.is_cancelled() {
            debug!(peer = %self.peer, "connection closed");
            self.closed.cancel();
        }
        result
    }

    /// Whether the output side is still open.
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    /// Whether [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection({})", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (Connection::new(server).unwrap(), client)
    }

    fn hello(name: &str) -> Message {
        Message::builder().kind(MessageType::Hello).from(name).build()
    }

    #[tokio::test]
    async fn send_writes_one_frame() {
        let (conn, mut raw) = pair().await;
        let msg = hello("alice");
        conn.send(&msg).await.unwrap();
        conn.close().await.unwrap();

        let mut bytes = String::new();
        let _ = raw.read_to_string(&mut bytes).await.unwrap();
        let expected = format!("{}\nHELLO\nalice\n\n\n", msg.timestamp().timestamp_millis());
        assert_eq!(bytes, expected);
    }

    #[tokio::test]
    async fn receive_decodes_frame_then_end_of_stream() {
        let (conn, mut raw) = pair().await;
        raw.write_all(b"1000\nNORMAL\nalice\n!BROADCAST\nhi\n").await.unwrap();
        raw.shutdown().await.unwrap();

        let msg = conn.receive().await.unwrap().unwrap();
        assert!(msg.is_broadcast());
        assert_eq!(msg.text(), "hi");
        assert_eq!(conn.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn receive_reports_malformed_frame() {
        let (conn, mut raw) = pair().await;
        raw.write_all(b"1000\nWHATEVER\n\n\n\n").await.unwrap();
        assert_matches!(conn.receive().await, Err(ChatError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn receive_reports_invalid_utf8_as_malformed_frame() {
        let (conn, mut raw) = pair().await;
        raw.write_all(b"1000\nNORMAL\n\xff\xfe\n!BROADCAST\nhi\n").await.unwrap();
        assert_matches!(conn.receive().await, Err(ChatError::MalformedFrame(_)));
    }

    #[tokio::test]
    async fn shutdown_read_unblocks_pending_receive() {
        let (conn, _raw) = pair().await;
        let conn = Arc::new(conn);
        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.receive().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.shutdown_read();
        let result = tokio::time::timeout(Duration::from_secs(2), reader)
            .await
            .unwrap()
            .unwrap();
        assert_matches!(result, Ok(None));
    }

    #[tokio::test]
    async fn shutdown_write_sends_fin_and_blocks_sends() {
        let (conn, mut raw) = pair().await;
        assert!(conn.is_writable());
        conn.shutdown_write().await.unwrap();
        assert!(!conn.is_writable());

        let mut buf = Vec::new();
        assert_eq!(raw.read_to_end(&mut buf).await.unwrap(), 0);

        assert!(!conn.try_send(&hello("a")).await.unwrap());
        assert_matches!(conn.send(&hello("a")).await, Err(ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (conn, _raw) = pair().await;
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(!conn.is_writable());
        assert_eq!(conn.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_senders_do_not_interleave_frames() {
        let (conn, raw) = pair().await;
        let conn = Arc::new(conn);
        let peer = Connection::new(raw).unwrap();
        let collector = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(msg) = peer.receive().await.unwrap() {
                received.push(msg);
            }
            received
        });

        let mut tasks = Vec::new();
        for i in 0..8 {
            let conn = Arc::clone(&conn);
            tasks.push(tokio::spawn(async move {
                for j in 0..20 {
                    let msg = Message::builder()
                        .from(format!("sender{i}"))
                        .to("bob")
                        .text(format!("message {j} {}", "x".repeat(512)))
                        .build();
                    conn.send(&msg).await.unwrap();
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        conn.close().await.unwrap();

        let received = collector.await.unwrap();
        assert_eq!(received.len(), 160);
        for msg in &received {
            assert!(msg.from().starts_with("sender"));
            assert_eq!(msg.to(), "bob");
        }
    }
}
