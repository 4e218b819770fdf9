//! Session registry: the map of live sessions, used only at shutdown.
//!
//! Steady-state forwarding never touches the registry.  Its one job is to
//! let process shutdown enumerate every live session and ask each to close,
//! exactly once, in any order.
//!
//! Sessions register at accept time and remove themselves on terminal
//! teardown.  Each entry holds a [`tokio::sync::Notify`] that the session's
//! event loop selects on; `shutdown_all` fires them all.  `Notify` stores a
//! permit when nobody is waiting yet, so a close request can never be lost
//! to a race with the session loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

/// The registry's view of one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Client address, for shutdown log lines.
    pub peer_addr: SocketAddr,
    /// Close signal the session's event loop selects on.
    pub close: Arc<Notify>,
}

/// Concurrency-safe map from session id to its handle.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session at accept time.
    pub async fn insert(&self, id: Uuid, handle: SessionHandle) {
        self.sessions.write().await.insert(id, handle);
    }

    /// Removes a session on terminal teardown.
    pub async fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    /// Number of currently registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Fires every session's close signal once.
    ///
    /// Sessions unregister themselves as they finish tearing down, so this
    /// does not remove entries; it only requests the close.
    pub async fn shutdown_all(&self) {
        let sessions = self.sessions.read().await;
        for (id, handle) in sessions.iter() {
            debug!("requesting close of session {id} ({})", handle.peer_addr);
            handle.close.notify_one();
        }
    }

    /// Waits until every session has unregistered, or `max_wait` elapses.
    ///
    /// Returns `true` when the registry drained in time.
    pub async fn await_drained(&self, max_wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if self.is_empty().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
