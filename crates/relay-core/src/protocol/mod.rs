//! Protocol module containing the binary field reader, the handshake
//! inspector, and the protocol-version table.

pub mod handshake;
pub mod reader;
pub mod versions;

pub use handshake::{inspect_first_packet, HandshakeRecord, Inspection};
pub use reader::ParseError;
