//! Outbound task: drains the command queue onto the connection.

use std::sync::Arc;

use chatroom_core::Message;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::client::Shared;

/// Work queued by the command surface.
#[derive(Debug)]
pub(crate) enum Outbound {
    Send(Message),
    /// Flush everything queued before this, then close.
    Leave,
}

pub(crate) async fn run(shared: Arc<Shared>, mut queue: UnboundedReceiver<Outbound>) {
    let connection = &shared.connection;
    loop {
        let command = tokio::select! {
            biased;
            () = connection.closed() => {
                debug!("connection closed, outbound task exiting");
                return;
            }
            command = queue.recv() => command,
        };

        match command {
            Some(Outbound::Send(message)) => match connection.try_send(&message).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(message = %message, "write side already shut down, dropping");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "send failed");
                    shared.report_connection_error();
                    break;
                }
            },
            Some(Outbound::Leave) | None => {
                shared.mark_leaving();
                debug!("leaving");
                break;
            }
        }
    }

    if let Err(e) = connection.close().await {
        debug!(error = %e, "error while closing connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LoginEvent;
    use chatroom_core::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    /// Shared state over a loopback socket, with no inbound task running.
    async fn shared_with_peer() -> (Arc<Shared>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        (Arc::new(Shared::new(Connection::new(stream).unwrap())), peer)
    }

    fn count_connection_errors(shared: &Shared) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let _ = shared.login.add(move |event| {
            if *event == LoginEvent::ConnectionError {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        count
    }

    fn chat(text: &str) -> Message {
        Message::builder().from("alice").broadcast().text(text).build()
    }

    #[tokio::test]
    async fn send_failure_reports_one_connection_error_and_closes() {
        let (shared, peer) = shared_with_peer().await;
        let errors = count_connection_errors(&shared);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(Arc::clone(&shared), rx));
        drop(peer);

        // The first write after the peer is gone draws a reset; a later one fails.
        tokio::time::timeout(WAIT, async {
            while !task.is_finished() {
                let _ = tx.send(Outbound::Send(chat("anyone?")));
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("outbound task kept writing to a dead peer");
        task.await.unwrap();

        assert_eq!(errors.load(Ordering::SeqCst), 1);
        tokio::time::timeout(WAIT, shared.connection.closed()).await.unwrap();
        assert!(!shared.connection.is_writable());
    }

    #[tokio::test]
    async fn write_side_already_shut_down_exits_quietly() {
        let (shared, _peer) = shared_with_peer().await;
        let errors = count_connection_errors(&shared);
        shared.connection.shutdown_write().await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Outbound::Send(chat("late"))).unwrap();
        tokio::time::timeout(WAIT, run(Arc::clone(&shared), rx)).await.unwrap();

        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(!shared.connection.is_closed());
    }

    #[tokio::test]
    async fn dropped_queue_closes_without_error() {
        let (shared, _peer) = shared_with_peer().await;
        let errors = count_connection_errors(&shared);
        let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
        drop(tx);

        tokio::time::timeout(WAIT, run(Arc::clone(&shared), rx)).await.unwrap();

        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(shared.is_leaving());
        assert!(shared.connection.is_closed());
    }
}
