//! JSON message types for the browser-facing WebSocket protocol.
//!
//! The relay itself is byte-transparent: game traffic travels as binary
//! WebSocket frames and is copied verbatim.  JSON appears in two places at
//! the edge:
//!
//! - **Relay → browser**: advisory status notifications ([`ClientNotice`]),
//!   sent as text frames so the page can show connection progress.  These
//!   are UX, not protocol: a client that ignores them works fine.
//! - **Browser → relay** (optional, `--json-ingress`): control envelopes
//!   ([`ControlEnvelope`]) that the relay translates into backend packet
//!   framing.
//!
//! Every JSON message is an object with a `"type"` field identifying the
//! variant; serde's `#[serde(tag = "type")]` handles the discriminant.
//!
//! # Ingress is classified once
//!
//! An inbound frame is turned into a [`ClientIngress`] exactly once at the
//! transport boundary and never re-inspected downstream.  Binary frames stay
//! bytes; text frames either parse as a [`ControlEnvelope`] or are dropped.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

// ── Relay → browser notifications ─────────────────────────────────────────────

/// Advisory notifications sent to the browser as JSON text frames.
///
/// # Serde representation
///
/// ```json
/// {"type":"handshake","status":"proxy_ready","timestamp":1700000000}
/// {"type":"status","status":"success","message":"minecraft_connected"}
/// {"type":"init","declared_protocol":46,"effective_protocol":47,"version_label":"1.8.x (protocol 47)"}
/// {"type":"error","code":"server_offline","message":"game server refused the connection"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientNotice {
    /// Sent immediately when the WebSocket session is established, before
    /// the backend connection attempt resolves.  Best-effort UX signal, not
    /// a protocol guarantee.
    Handshake { status: String, timestamp: u64 },

    /// Connection progress: backend connected, reconnecting, etc.
    Status { status: String, message: String },

    /// Sent after the first client packet was inspected, reporting the
    /// declared and effective protocol versions.
    Init {
        declared_protocol: i16,
        effective_protocol: i16,
        version_label: String,
    },

    /// A structured error the page can display.
    Error { code: String, message: String },
}

impl ClientNotice {
    /// The advisory "proxy is up, backend pending" signal.
    pub fn proxy_ready() -> Self {
        Self::Handshake {
            status: "proxy_ready".to_string(),
            timestamp: unix_now_secs(),
        }
    }

    /// Backend connection established.
    pub fn connected() -> Self {
        Self::Status {
            status: "success".to_string(),
            message: "minecraft_connected".to_string(),
        }
    }

    /// A reconnection attempt has been scheduled.
    pub fn reconnecting(attempt: u8, max: u8) -> Self {
        Self::Status {
            status: "reconnecting".to_string(),
            message: format!("backend connection lost; attempt {attempt} of {max}"),
        }
    }

    /// The backend actively refused the connection.
    pub fn server_offline() -> Self {
        Self::Error {
            code: "server_offline".to_string(),
            message: "game server refused the connection".to_string(),
        }
    }
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Browser → relay control envelopes ─────────────────────────────────────────

/// JSON control envelopes accepted on text frames in `--json-ingress` mode.
///
/// # Serde representation
///
/// ```json
/// {"type":"chat","text":"hello"}
/// {"type":"packet","data":"AAECAw=="}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlEnvelope {
    /// A chat line, framed by the relay as a chat packet for the backend.
    Chat { text: String },

    /// A pre-built packet, base64-encoded; decoded and written verbatim.
    Packet { data: String },
}

// ── Classified inbound message ────────────────────────────────────────────────

/// An inbound client message after one-time classification at the transport
/// boundary: either raw relay bytes or a parsed control envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientIngress {
    /// An opaque binary payload, relayed to the backend as-is (after the
    /// one-time first-packet inspection).
    Binary(Vec<u8>),

    /// A parsed JSON control envelope, translated by the application layer.
    Control(ControlEnvelope),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── ClientNotice serialization ───────────────────────────────────────────

    #[test]
    fn test_proxy_ready_serializes_with_type_discriminant() {
        let json = serde_json::to_string(&ClientNotice::proxy_ready()).unwrap();
        assert!(json.contains(r#""type":"handshake""#));
        assert!(json.contains(r#""status":"proxy_ready""#));
        assert!(json.contains(r#""timestamp""#));
    }

    #[test]
    fn test_connected_notice_shape() {
        let json = serde_json::to_string(&ClientNotice::connected()).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""status":"success""#));
        assert!(json.contains("minecraft_connected"));
    }

    #[test]
    fn test_server_offline_notice_shape() {
        let json = serde_json::to_string(&ClientNotice::server_offline()).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":"server_offline""#));
    }

    #[test]
    fn test_reconnecting_notice_includes_attempt_count() {
        let json = serde_json::to_string(&ClientNotice::reconnecting(2, 3)).unwrap();
        assert!(json.contains(r#""status":"reconnecting""#));
        assert!(json.contains("attempt 2 of 3"));
    }

    #[test]
    fn test_init_notice_round_trips() {
        let original = ClientNotice::Init {
            declared_protocol: 46,
            effective_protocol: 47,
            version_label: "1.8.x (protocol 47)".to_string(),
        };
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains(r#""type":"init""#));
        let decoded: ClientNotice = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    // ── ControlEnvelope deserialization ──────────────────────────────────────

    #[test]
    fn test_chat_envelope_parses() {
        let env: ControlEnvelope = serde_json::from_str(r#"{"type":"chat","text":"hi"}"#).unwrap();
        assert_eq!(
            env,
            ControlEnvelope::Chat {
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_packet_envelope_parses() {
        let env: ControlEnvelope =
            serde_json::from_str(r#"{"type":"packet","data":"AAECAw=="}"#).unwrap();
        assert_eq!(
            env,
            ControlEnvelope::Packet {
                data: "AAECAw==".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_envelope_type_is_an_error() {
        let result: Result<ControlEnvelope, _> =
            serde_json::from_str(r#"{"type":"teleport","x":1}"#);
        assert!(result.is_err(), "unknown type must fail to parse");
    }

    #[test]
    fn test_missing_type_field_is_an_error() {
        let result: Result<ControlEnvelope, _> = serde_json::from_str(r#"{"text":"hi"}"#);
        assert!(result.is_err());
    }
}
