//! Application layer for relay-bridge.
//!
//! Pure translation logic between the JSON control envelopes accepted on the
//! WebSocket (in `--json-ingress` mode) and the backend's byte-stream packet
//! framing.  No sockets, no tasks, no async; the infrastructure layer calls
//! these functions and writes the resulting bytes.

pub mod ingress;

pub use ingress::{encode_control, IngressError, CHAT_PACKET_ID};
