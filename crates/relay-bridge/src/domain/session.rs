//! Per-session lifecycle state machine.
//!
//! Every client session moves through the same states:
//!
//! ```text
//! connecting → connected ⇄ reconnecting → closed
//! ```
//!
//! `closed` is terminal, reachable from every state, and idempotent:
//! re-entering it is a no-op, which is how the bridge guarantees that
//! "closing one side closes the other" fires exactly once no matter how many
//! close events race in.
//!
//! The struct is deliberately I/O-free.  The async session loop in the
//! infrastructure layer reports events (`backend connected`, `backend
//! lost`, `close`) and acts on the decisions returned here, so reconnect
//! accounting and teardown idempotence are plain unit-testable logic.

/// Lifecycle states of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial backend connection attempt in flight.
    Connecting,
    /// Backend connected; traffic is being relayed.
    Connected,
    /// Backend lost; a bounded reconnection attempt is pending.
    Reconnecting,
    /// Terminal. Both transports are (being) closed.
    Closed,
}

/// What the session should do after losing its backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait the configured backoff, then attempt connection number
    /// `attempt` (1-based).
    Retry { attempt: u8 },
    /// The reconnect budget is spent (or the session is already closed);
    /// tear the session down.
    GiveUp,
}

/// Tracks one session's state, reconnect budget, and first-message flag.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
    reconnect_count: u8,
    max_reconnects: u8,
    first_message_seen: bool,
}

impl SessionLifecycle {
    /// A fresh session, about to attempt its first backend connection.
    pub fn new(max_reconnects: u8) -> Self {
        Self {
            state: SessionState::Connecting,
            reconnect_count: 0,
            max_reconnects,
            first_message_seen: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub fn reconnect_count(&self) -> u8 {
        self.reconnect_count
    }

    /// The backend connection attempt succeeded.
    ///
    /// Resets the reconnect budget: a session that recovers gets the full
    /// allowance again for the next outage.  Ignored once closed.
    pub fn on_backend_connected(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Connected;
        self.reconnect_count = 0;
    }

    /// The backend connection failed or was lost (EOF, reset, refused,
    /// idle timeout).  Decides whether to schedule another attempt.
    pub fn on_backend_lost(&mut self) -> ReconnectDecision {
        if self.state == SessionState::Closed {
            return ReconnectDecision::GiveUp;
        }
        if self.reconnect_count < self.max_reconnects {
            self.reconnect_count += 1;
            self.state = SessionState::Reconnecting;
            ReconnectDecision::Retry {
                attempt: self.reconnect_count,
            }
        } else {
            ReconnectDecision::GiveUp
        }
    }

    /// Flips the first-message flag.  Returns `true` exactly once, for the
    /// message that should be routed through the handshake inspector.
    pub fn note_first_message(&mut self) -> bool {
        if self.first_message_seen {
            false
        } else {
            self.first_message_seen = true;
            true
        }
    }

    /// Enters the terminal state.  Returns `true` only on the first call so
    /// the caller performs teardown exactly once; later calls are no-ops.
    pub fn begin_close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            false
        } else {
            self.state = SessionState::Closed;
            true
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
