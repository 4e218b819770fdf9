//! relay-bridge library crate.
//!
//! This crate implements a WebSocket-to-TCP relay that lets browser-based
//! Minecraft clients, which can only speak WebSocket, reach a game server
//! that only speaks raw TCP on a fixed host and port.
//!
//! # Architecture
//!
//! ```text
//! Browser game client (binary frames over WebSocket)
//!         ↕
//! [relay-bridge]
//!   ├── domain/           Pure types: config, JSON envelopes, session state machine
//!   ├── application/      Translation: JSON control envelopes → backend bytes
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop + per-session bridge
//!         ├── backend/    TCP connection to the game server
//!         └── registry/   Session registry for shutdown enumeration
//!         ↕
//! Minecraft server (raw TCP byte stream)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no dependencies beyond serde and `relay-core` constants
//!   (no I/O, no async).
//! - `application` depends on `domain` and `relay-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.
//!
//! The split keeps the relay's decision logic (when to reconnect, when a
//! session is closed, what the first packet becomes) testable without a
//! network, while the infrastructure layer stays a thin I/O shell.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: ingress translation logic.
pub mod application;

/// Infrastructure layer: WebSocket server, backend TCP connection, registry.
pub mod infrastructure;
