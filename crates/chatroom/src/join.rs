//! Line-oriented terminal client.
//!
//! Prompts for a name until the server accepts one, then reads chat lines
//! from stdin. `/msg <name> <text>` sends privately, `/who` lists who is
//! present, `/quit` leaves.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chatroom_client::{ChatClient, LoginEvent, RoomEvent};
use chatroom_core::ChatError;
use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// A parsed chat input line.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Broadcast(&'a str),
    Private { to: &'a str, text: &'a str },
    Who,
    Quit,
    Skip,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim_end();
    if line.is_empty() {
        return Input::Skip;
    }
    if line == "/quit" {
        return Input::Quit;
    }
    if line == "/who" {
        return Input::Who;
    }
    if let Some(rest) = line.strip_prefix("/msg ") {
        return match rest.trim_start().split_once(' ') {
            Some((to, text)) if !text.trim().is_empty() => Input::Private { to, text },
            _ => Input::Skip,
        };
    }
    Input::Broadcast(line)
}

fn clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Private messages only ever reach their recipient, so no "to" is shown.
fn render(event: &RoomEvent) -> String {
    match event {
        RoomEvent::Message(message) if message.is_broadcast() => {
            format!("[{}] {}: {}", clock(message.timestamp()), message.from(), message.text())
        }
        RoomEvent::Message(message) => format!(
            "[{}] {} (private): {}",
            clock(message.timestamp()),
            message.from(),
            message.text()
        ),
        RoomEvent::Joined { at, name } => format!("[{}] * {name} joined", clock(*at)),
        RoomEvent::Left { at, name } => format!("[{}] * {name} left", clock(*at)),
    }
}

fn render_roster(names: &[String]) -> String {
    format!("In the room ({}): {}", names.len(), names.join(", "))
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    lines.next_line().await.context("Failed to read stdin")
}

/// Connect, log in, and chat until `/quit`, end of input or disconnect.
pub async fn run(address: &str, port: u16, name: Option<String>, max_line_length: usize) -> Result<()> {
    let client = ChatClient::connect_with((address, port), max_line_length)
        .await
        .with_context(|| format!("Failed to connect to {address}:{port}"))?;

    let (login_tx, mut login_rx) = mpsc::unbounded_channel();
    let _ = client.add_login_listener(move |event| {
        let _ = login_tx.send(*event);
    });
    // Presence replay follows the login reply immediately, so this must be
    // in place before HELLO goes out.
    let _ = client.add_room_listener(|event| println!("{}", render(event)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let logged_in = login(&client, &mut lines, &mut login_rx, name).await;
    let result = match logged_in {
        Ok(true) => chat(&client, &mut lines, &mut login_rx).await,
        Ok(false) => Ok(()),
        Err(e) => Err(e),
    };
    client.shutdown().await;
    result
}

/// Returns `Ok(false)` if input ended before a name was accepted.
async fn login(
    client: &ChatClient,
    lines: &mut Lines<BufReader<Stdin>>,
    events: &mut UnboundedReceiver<LoginEvent>,
    mut name: Option<String>,
) -> Result<bool> {
    loop {
        let candidate = match name.take() {
            Some(name) => name,
            None => {
                prompt("Name: ");
                match read_line(lines).await? {
                    Some(line) => line.trim().to_string(),
                    None => return Ok(false),
                }
            }
        };
        if let Err(e) = client.send_hello(&candidate) {
            println!("{e}");
            continue;
        }
        match events.recv().await {
            Some(LoginEvent::Successful) => {
                println!("Logged in as {candidate}. Type /msg <name> <text> to whisper, /who to list guests, /quit to leave.");
                return Ok(true);
            }
            Some(LoginEvent::NameRejected) => println!("The name {candidate:?} is taken."),
            Some(LoginEvent::ConnectionError) | None => bail!("connection to server lost"),
        }
    }
}

async fn chat(
    client: &ChatClient,
    lines: &mut Lines<BufReader<Stdin>>,
    events: &mut UnboundedReceiver<LoginEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            line = read_line(lines) => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let sent = match parse_input(&line) {
                    Input::Broadcast(text) => client.send_broadcast(text),
                    Input::Private { to, text } => client.send_private(to, text),
                    Input::Who => {
                        println!("{}", render_roster(&client.roster()));
                        Ok(())
                    }
                    Input::Quit => return Ok(()),
                    Input::Skip => Ok(()),
                };
                match sent {
                    Ok(()) => {}
                    Err(ChatError::Disconnected) => bail!("connection to server lost"),
                    Err(e) => println!("{e}"),
                }
            }
            event = events.recv() => {
                if matches!(event, Some(LoginEvent::ConnectionError) | None) {
                    bail!("connection to server lost");
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatroom_core::Message;
    use chrono::TimeZone;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_input("hello there"), Input::Broadcast("hello there"));
        assert_eq!(parse_input("/msg bob hi bob"), Input::Private { to: "bob", text: "hi bob" });
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/who"), Input::Who);
        assert_eq!(parse_input("   "), Input::Skip);
        assert_eq!(parse_input("/msg bob"), Input::Skip);
        assert_eq!(parse_input("/msg bob   "), Input::Skip);
    }

    #[test]
    fn renders_roster() {
        let names = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(render_roster(&names), "In the room (2): alice, bob");
    }

    #[test]
    fn renders_presence_and_messages() {
        let at = Utc.timestamp_opt(0, 0).unwrap();
        let joined = render(&RoomEvent::Joined { at, name: "alice".into() });
        assert!(joined.ends_with("* alice joined"));

        let broadcast = Message::builder().timestamp(at).from("alice").broadcast().text("hi").build();
        assert!(render(&RoomEvent::Message(broadcast)).ends_with("alice: hi"));

        let private = Message::builder().timestamp(at).from("alice").to("bob").text("psst").build();
        assert!(render(&RoomEvent::Message(private)).ends_with("alice (private): psst"));
    }
}
