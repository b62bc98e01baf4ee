//! Inbound task: decodes frames and fans them out to listeners.

use std::sync::Arc;

use chatroom_core::{ChatError, Message, MessageType};
use tracing::{debug, info, warn};

use crate::client::Shared;
use crate::events::{LoginEvent, RoomEvent};

pub(crate) async fn run(shared: Arc<Shared>) {
    loop {
        match shared.connection.receive().await {
            Ok(Some(message)) => dispatch(&shared, message),
            Ok(None) => {
                debug!("server closed the stream");
                break;
            }
            Err(ChatError::MalformedFrame(reason)) => {
                warn!(reason = %reason, "incorrect message format from server");
                break;
            }
            Err(e) => {
                warn!(error = %e, "network communication error");
                break;
            }
        }
    }

    if shared.is_leaving() {
        // The outbound task flushes queued messages and closes.
        return;
    }
    shared.report_connection_error();
    if let Err(e) = shared.connection.close().await {
        debug!(error = %e, "error while closing connection");
    }
}

/// The roster is updated before listeners run so they observe the new state.
fn dispatch(shared: &Shared, message: Message) {
    match message.kind() {
        MessageType::Normal => shared.room.emit(&RoomEvent::Message(message)),
        MessageType::Joined => emit_presence(
            shared,
            RoomEvent::Joined {
                at: message.timestamp(),
                name: message.from().to_string(),
            },
        ),
        MessageType::Left => emit_presence(
            shared,
            RoomEvent::Left {
                at: message.timestamp(),
                name: message.from().to_string(),
            },
        ),
        MessageType::LoginSuccessful => {
            info!("login accepted");
            shared.set_logged_in();
            shared.login.emit(&LoginEvent::Successful);
        }
        MessageType::RejectedUserName => {
            info!("name rejected");
            shared.login.emit(&LoginEvent::NameRejected);
        }
        MessageType::Hello => {
            warn!(message = %message, "unexpected message type from server, ignoring");
        }
    }
}

fn emit_presence(shared: &Shared, event: RoomEvent) {
    shared.roster.apply(&event);
    shared.room.emit(&event);
}
