//! # relay-core
//!
//! Shared protocol library for mc-ws-relay, the WebSocket-to-TCP relay that
//! lets browser-based Minecraft clients reach a plain TCP game server.
//!
//! This crate contains everything that can be tested without opening a
//! socket: the binary field reader for the Minecraft handshake record, the
//! first-packet inspector that patches too-old protocol versions, and the
//! static protocol-version → release-label table.
//!
//! It has zero dependencies on async runtimes, sockets, or OS APIs.  The
//! `relay-bridge` binary layers networking on top of it.
//!
//! # Module map
//!
//! - **`protocol::reader`** – cursor-threaded primitive reads (u8 / i8 /
//!   big-endian i16 / length-prefixed string) over untrusted byte buffers.
//!   Every read either consumes exactly the bytes it declares or fails with a
//!   typed [`protocol::reader::ParseError`]; nothing ever reads past the end
//!   of the input.
//!
//! - **`protocol::handshake`** – the Minecraft connection handshake record
//!   (packet id 0x00) and the advisory inspector that rewrites its
//!   protocol-version field when a client declares a version below the
//!   configured minimum.
//!
//! - **`protocol::versions`** – static lookup from protocol number to a
//!   human-readable release label, used for log lines and client-facing
//!   notifications.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `relay_core::inspect_first_packet` instead of the full module path.
pub use protocol::handshake::{
    inspect_first_packet, parse_handshake, HandshakeRecord, Inspection,
    DEFAULT_MIN_PROTOCOL_VERSION, HANDSHAKE_PACKET_ID,
};
pub use protocol::reader::ParseError;
pub use protocol::versions::{describe, protocol_label};
