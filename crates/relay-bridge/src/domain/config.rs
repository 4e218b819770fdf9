//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is constructed from CLI arguments in `main.rs` (with environment
//! variable overrides) or from defaults in tests, then wrapped in an `Arc`
//! and shared across all session tasks.
//!
//! Keeping configuration as a plain struct, with no environment reads inside
//! the domain, keeps the bridge easy to embed in tests.

use std::net::SocketAddr;
use std::time::Duration;

use relay_core::DEFAULT_MIN_PROTOCOL_VERSION;

/// All runtime configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address and port the WebSocket listener binds to.
    ///
    /// `0.0.0.0` accepts connections from any interface; browsers connect to
    /// this port with `ws://host:port`.
    pub listen_addr: SocketAddr,

    /// Fixed address of the backend Minecraft server.  Every session
    /// connects (and reconnects) to this one address.
    pub backend_addr: SocketAddr,

    /// Lowest protocol version the backend accepts.  A first packet that
    /// declares a lower version gets its version bytes rewritten to this
    /// value.  47 is the 1.8.x protocol.
    pub min_protocol_version: i16,

    /// Bound on the backend connect attempt, and the longest the backend may
    /// stay silent before its connection is treated as dead.  This is
    /// distinct from a backend-initiated close.
    pub idle_timeout: Duration,

    /// How many times a session re-attempts the backend connection after a
    /// failure before giving up and closing the client.
    pub max_reconnects: u8,

    /// Fixed delay before each reconnection attempt.
    pub reconnect_backoff: Duration,

    /// When `true`, text frames are parsed as JSON control envelopes
    /// (`chat` / `packet`) and translated to backend packet framing.  When
    /// `false` (the default), text frames are logged and ignored.
    pub json_ingress: bool,
}

impl Default for RelayConfig {
    /// Defaults suitable for running next to a local server.
    ///
    /// | Field                | Default           |
    /// |----------------------|-------------------|
    /// | listen_addr          | `0.0.0.0:8080`    |
    /// | backend_addr         | `127.0.0.1:25565` |
    /// | min_protocol_version | 47                |
    /// | idle_timeout         | 10 s              |
    /// | max_reconnects       | 3                 |
    /// | reconnect_backoff    | 1000 ms           |
    /// | json_ingress         | false             |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address strings.
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            backend_addr: "127.0.0.1:25565".parse().unwrap(),
            min_protocol_version: DEFAULT_MIN_PROTOCOL_VERSION,
            idle_timeout: Duration::from_secs(10),
            max_reconnects: 3,
            reconnect_backoff: Duration::from_millis(1000),
            json_ingress: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
