//! The Minecraft connection handshake record and the first-packet inspector.
//!
//! The first packet a Minecraft client sends declares which protocol version
//! it speaks and which server it wants.  Browser builds of the game are often
//! pinned to an older protocol number than the backend accepts, so the relay
//! inspects the first message of each session and, when the declared version
//! is below a configured minimum, rewrites the two version bytes in place.
//!
//! Record layout (all multi-byte integers big-endian):
//!
//! ```text
//! [packet_id: u8 = 0x00]
//! [protocol_version: i16]
//! [server_address: i16 length prefix + UTF-8 bytes]
//! [server_port: i16]
//! [next_state: i8]
//! ```
//!
//! # The inspector is advisory only
//!
//! `inspect_first_packet` must never stop a message from being delivered.
//! Anything that is not a complete, recognisable handshake – wrong packet id,
//! too short, truncated fields – is passed through byte-for-byte.  The only
//! transformation it ever performs is overwriting bytes 1–2 with the minimum
//! version, and only when those two bytes were readable.

use std::borrow::Cow;

use tracing::debug;

use crate::protocol::reader::{read_i16, read_i8, read_string, read_u8, ParseError};

/// Packet id of the connection handshake, always the first record of a session.
pub const HANDSHAKE_PACKET_ID: u8 = 0x00;

/// Lowest protocol version the backend accepts; 47 is the 1.8.x protocol.
pub const DEFAULT_MIN_PROTOCOL_VERSION: i16 = 47;

/// Parsed view of a handshake record.
///
/// Exists only transiently while the first message of a session is inspected;
/// nothing is persisted.  The parse consumes at most `buffer.len()` bytes or
/// fails without producing a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRecord {
    pub packet_id: u8,
    pub protocol_version: i16,
    pub server_address: String,
    pub server_port: i16,
    pub next_state: i8,
}

/// Parses a complete handshake record from the start of `buf`.
///
/// Trailing bytes after the record are permitted and ignored; the relay
/// forwards them untouched either way.
///
/// # Errors
///
/// Returns [`ParseError`] if any field is truncated, a length prefix is
/// negative, or the server address is not UTF-8.
pub fn parse_handshake(buf: &[u8]) -> Result<HandshakeRecord, ParseError> {
    let (packet_id, cursor) = read_u8(buf, 0)?;
    let (protocol_version, cursor) = read_i16(buf, cursor)?;
    let (server_address, cursor) = read_string(buf, cursor)?;
    let (server_port, cursor) = read_i16(buf, cursor)?;
    let (next_state, _cursor) = read_i8(buf, cursor)?;

    Ok(HandshakeRecord {
        packet_id,
        protocol_version,
        server_address,
        server_port,
        next_state,
    })
}

/// Outcome of inspecting the first message of a session.
#[derive(Debug)]
pub struct Inspection<'a> {
    /// The bytes to forward to the backend.  Borrowed from the input when no
    /// rewrite happened; an owned patched copy when one did.
    pub payload: Cow<'a, [u8]>,

    /// `true` when bytes 1–2 were overwritten with the minimum version.
    pub rewritten: bool,

    /// The protocol version the client declared, when bytes 1–2 were
    /// readable as part of a handshake packet.
    pub declared_version: Option<i16>,

    /// The fully parsed record, when every field was readable.
    pub record: Option<HandshakeRecord>,
}

impl Inspection<'_> {
    /// Consumes the inspection, returning the forwardable bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.payload.into_owned()
    }
}

/// Inspects the first message of a session and patches the protocol version
/// if it is below `min_version`.
///
/// Pure function: same input always yields the same output, and the input
/// buffer is never mutated – a rewrite produces a new copy.
///
/// Decision table:
///
/// - Shorter than 3 bytes, or byte 0 is not [`HANDSHAKE_PACKET_ID`] → the
///   message is not a handshake; returned borrowed and unmodified.
/// - Declared version ≥ `min_version` → returned borrowed and unmodified.
/// - Declared version < `min_version` → byte-exact copy with bytes 1–2
///   replaced by `min_version` big-endian.  All other bytes, including any
///   the parser could not reach, are preserved verbatim.
///
/// A record whose later fields are truncated still gets its version patched:
/// the two version bytes are all the rewrite touches, and delivery must not
/// depend on the rest of the record being parseable.
pub fn inspect_first_packet(raw: &[u8], min_version: i16) -> Inspection<'_> {
    // Not a handshake: too short to carry a version, or wrong packet id.
    if raw.len() < 3 || raw[0] != HANDSHAKE_PACKET_ID {
        return Inspection {
            payload: Cow::Borrowed(raw),
            rewritten: false,
            declared_version: None,
            record: None,
        };
    }

    // The length check above guarantees bytes 1-2 exist.
    let (declared, _) = read_i16(raw, 1).expect("length checked above");

    // Best-effort full parse.  Failure is logged but never blocks delivery.
    let record = match parse_handshake(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("partial handshake parse ({e}); forwarding as-is");
            None
        }
    };

    if declared >= min_version {
        return Inspection {
            payload: Cow::Borrowed(raw),
            rewritten: false,
            declared_version: Some(declared),
            record,
        };
    }

    let mut patched = raw.to_vec();
    patched[1..3].copy_from_slice(&min_version.to_be_bytes());

    Inspection {
        payload: Cow::Owned(patched),
        rewritten: true,
        declared_version: Some(declared),
        record,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
