//! Infrastructure layer for relay-bridge.
//!
//! All the I/O lives here: accepting WebSocket connections from browsers,
//! opening TCP connections to the game server, and the registry used to
//! enumerate live sessions at shutdown.
//!
//! Protocol inspection (relay-core), envelope translation (application
//! layer), and the session state machine (domain layer) stay out of this
//! module; it only wires them to real transports.

pub mod backend;
pub mod registry;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use registry::SessionRegistry;
pub use ws_server::run_server;
