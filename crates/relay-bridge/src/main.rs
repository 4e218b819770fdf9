//! mc-ws-relay entry point.
//!
//! This binary accepts WebSocket connections from browser-based Minecraft
//! clients and relays them to a game server that only speaks raw TCP.
//! Browsers cannot open TCP sockets, so the relay terminates the WebSocket,
//! opens a TCP connection per session, and copies bytes both ways — patching
//! the protocol-version field of the first handshake packet when a client
//! declares a version older than the backend accepts.
//!
//! # Usage
//!
//! ```text
//! relay-bridge [OPTIONS]
//!
//! Options:
//!   --listen-port <PORT>            WebSocket listener port [default: 8080]
//!   --listen-bind <ADDR>            Bind address [default: 0.0.0.0]
//!   --mc-host <HOST>                Backend server IP [default: 127.0.0.1]
//!   --mc-port <PORT>                Backend server port [default: 25565]
//!   --min-protocol-version <N>      Lowest accepted protocol [default: 47]
//!   --idle-timeout-secs <SECS>      Backend idle timeout [default: 10]
//!   --max-reconnects <N>            Reconnect attempts per outage [default: 3]
//!   --reconnect-backoff-ms <MS>     Delay between attempts [default: 1000]
//!   --json-ingress                  Accept JSON control envelopes on text frames
//! ```
//!
//! # Environment variable overrides
//!
//! Every flag can also be set through the environment; CLI args take
//! precedence when both are present.
//!
//! | Variable                      | Default     |
//! |-------------------------------|-------------|
//! | `RELAY_LISTEN_PORT`           | `8080`      |
//! | `RELAY_LISTEN_BIND`           | `0.0.0.0`   |
//! | `RELAY_MC_HOST`               | `127.0.0.1` |
//! | `RELAY_MC_PORT`               | `25565`     |
//! | `RELAY_MIN_PROTOCOL`          | `47`        |
//! | `RELAY_IDLE_TIMEOUT`          | `10`        |
//! | `RELAY_MAX_RECONNECTS`        | `3`         |
//! | `RELAY_RECONNECT_BACKOFF_MS`  | `1000`      |
//! | `RELAY_JSON_INGRESS`          | `false`     |

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_bridge::domain::RelayConfig;
use relay_bridge::infrastructure::{run_server, SessionRegistry};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket-to-TCP relay for browser-based Minecraft clients.
#[derive(Debug, Parser)]
#[command(
    name = "relay-bridge",
    about = "WebSocket-to-TCP relay for browser-based Minecraft clients",
    version
)]
struct Cli {
    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = 8080, env = "RELAY_LISTEN_PORT")]
    listen_port: u16,

    /// IP address to bind the WebSocket listener to.
    ///
    /// `0.0.0.0` accepts connections from any interface; `127.0.0.1`
    /// accepts only local connections.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_LISTEN_BIND")]
    listen_bind: String,

    /// IP address of the backend Minecraft server.
    #[arg(long, default_value = "127.0.0.1", env = "RELAY_MC_HOST")]
    mc_host: String,

    /// TCP port of the backend Minecraft server.
    #[arg(long, default_value_t = 25565, env = "RELAY_MC_PORT")]
    mc_port: u16,

    /// Lowest protocol version the backend accepts.  First packets declaring
    /// a lower version are patched to this value.
    #[arg(
        long,
        default_value_t = relay_core::DEFAULT_MIN_PROTOCOL_VERSION,
        env = "RELAY_MIN_PROTOCOL"
    )]
    min_protocol_version: i16,

    /// Bound on the backend connect attempt and on backend read inactivity,
    /// in seconds.
    #[arg(long, default_value_t = 10, env = "RELAY_IDLE_TIMEOUT")]
    idle_timeout_secs: u64,

    /// Backend reconnection attempts per outage before the session closes.
    #[arg(long, default_value_t = 3, env = "RELAY_MAX_RECONNECTS")]
    max_reconnects: u8,

    /// Delay before each reconnection attempt, in milliseconds.
    #[arg(long, default_value_t = 1000, env = "RELAY_RECONNECT_BACKOFF_MS")]
    reconnect_backoff_ms: u64,

    /// Accept JSON control envelopes (`chat` / `packet`) on text frames.
    #[arg(long, env = "RELAY_JSON_INGRESS")]
    json_ingress: bool,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--listen-bind` or `--mc-host` is not a valid IP
    /// address.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let listen_addr: SocketAddr = format!("{}:{}", self.listen_bind, self.listen_port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid listen address: '{}:{}'",
                    self.listen_bind, self.listen_port
                )
            })?;

        let backend_addr: SocketAddr = format!("{}:{}", self.mc_host, self.mc_port)
            .parse()
            .with_context(|| format!("invalid backend address: '{}:{}'", self.mc_host, self.mc_port))?;

        Ok(RelayConfig {
            listen_addr,
            backend_addr,
            min_protocol_version: self.min_protocol_version,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_reconnects: self.max_reconnects,
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            json_ingress: self.json_ingress,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log level comes from RUST_LOG; default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_relay_config()?;

    info!(
        "mc-ws-relay starting — listen={}, backend={}",
        config.listen_addr, config.backend_addr
    );

    // Graceful shutdown flag, cleared by Ctrl+C.  The accept loop polls it
    // every 200 ms and then closes every registered session.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    let registry = Arc::new(SessionRegistry::new());
    run_server(config, registry, running).await?;

    info!("mc-ws-relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
