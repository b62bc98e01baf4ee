//! # chatroom
//!
//! Binary entry point: `chatroom serve` runs the server, `chatroom join`
//! runs a line-oriented terminal client.

#![deny(unsafe_code)]

mod join;

use anyhow::{Context, Result};
use chatroom_core::logging::{LogFormat, init_subscriber};
use chatroom_server::metrics::{install_recorder, render};
use chatroom_server::{ChatServer, ServerConfig};
use chatroom_settings::ChatSettings;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Multi-user chat room over TCP.
#[derive(Parser, Debug)]
#[command(name = "chatroom", version, about = "Multi-user chat room over TCP")]
struct Cli {
    /// Log level filter (overrides settings; `RUST_LOG` still wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,

        /// Maximum concurrently served connections.
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Join a chat server from the terminal.
    Join {
        /// Server host name or address.
        address: String,

        /// Server port.
        #[arg(long)]
        port: Option<u16>,

        /// Name to request instead of prompting.
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings are needed for the log level, so a load failure is reported
    // once logging is up.
    let (mut settings, load_error) = match chatroom_settings::load_settings() {
        Ok(settings) => (settings, None),
        Err(e) => (ChatSettings::default(), Some(e)),
    };
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    if cli.log_json {
        settings.logging.json = true;
    }
    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let _ = init_subscriber(&settings.logging.level, format);
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "failed to load settings, using defaults");
    }

    match cli.command {
        Command::Serve {
            host,
            port,
            max_connections,
        } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if max_connections.is_some() {
                settings.server.max_connections = max_connections;
            }
            settings.validate();
            serve(&settings).await
        }
        Command::Join { address, port, name } => {
            let port = port.unwrap_or(settings.client.server_port);
            join::run(&address, port, name, settings.protocol.max_line_length).await
        }
    }
}

async fn serve(settings: &ChatSettings) -> Result<()> {
    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable");
            None
        }
    };

    let addr = settings.server.bind_address();
    let server = ChatServer::bind(addr.as_str(), ServerConfig::from_settings(settings))
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %server.local_addr()?, "chat server listening");

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    handle.await.context("accept loop panicked")??;

    if let Some(handle) = metrics {
        tracing::info!(metrics = %render(&handle), "final metrics");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
