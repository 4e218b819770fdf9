//! Translation of JSON control envelopes into backend packet framing.
//!
//! In `--json-ingress` mode a browser may send text frames instead of
//! pre-framed binary packets:
//!
//! - `{"type":"chat","text":...}` becomes a chat packet: packet id `0x01`,
//!   a big-endian 16-bit byte-length prefix, then the raw UTF-8 text.
//! - `{"type":"packet","data":...}` carries a base64-encoded packet that is
//!   decoded and written to the backend verbatim.
//!
//! Translation happens once, at ingress; downstream code only ever sees the
//! resulting bytes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

use crate::domain::messages::ControlEnvelope;

/// Packet id the backend expects for chat lines.
pub const CHAT_PACKET_ID: u8 = 0x01;

/// Errors from translating a control envelope.
///
/// Business-logic failures (malformed input from the browser), not I/O
/// errors.  The session logs these and drops the message; they never tear
/// the session down.
#[derive(Debug, Error)]
pub enum IngressError {
    /// The `packet` envelope's payload was not valid base64.
    #[error("invalid base64 in packet envelope: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// The chat text does not fit behind a 16-bit length prefix.
    #[error("chat text too long: {length} bytes exceeds {max}")]
    ChatTooLong { length: usize, max: usize },
}

/// Translates a control envelope into the bytes to write to the backend.
///
/// # Errors
///
/// Returns [`IngressError`] when the envelope cannot be translated; the
/// caller drops the message and keeps the session alive.
pub fn encode_control(envelope: &ControlEnvelope) -> Result<Vec<u8>, IngressError> {
    match envelope {
        ControlEnvelope::Chat { text } => {
            let bytes = text.as_bytes();
            if bytes.len() > u16::MAX as usize {
                return Err(IngressError::ChatTooLong {
                    length: bytes.len(),
                    max: u16::MAX as usize,
                });
            }
            let mut packet = Vec::with_capacity(3 + bytes.len());
            packet.push(CHAT_PACKET_ID);
            packet.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            packet.extend_from_slice(bytes);
            Ok(packet)
        }

        ControlEnvelope::Packet { data } => Ok(BASE64.decode(data)?),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
