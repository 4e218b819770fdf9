//! TCP connection management for the backend game server.
//!
//! Each client session gets its own TCP connection to the fixed backend
//! address.  The connection's lifetime is
//!
//! ```text
//! connect (bounded by the idle timeout)
//!   → reader task pumps received chunks into an mpsc channel
//!   → the channel closing signals EOF / reset / idle timeout to the session
//! ```
//!
//! Reconnection is owned by the session bridge: when a connection dies, the
//! bridge decides whether to call [`BackendConnection::connect`] again.  The
//! connector itself never retries.
//!
//! Writes are best-effort.  The relay never buffers for an unwritable
//! backend; a failed write is reported to the caller, which counts and drops
//! it (the reader task notices a genuinely dead connection on its own).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// A backend connection attempt that did not reach `connected`.
///
/// The classification drives user-visible behavior: `Refused` produces the
/// structured "server offline" notification before the normal
/// close/reconnect handling runs.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The backend actively refused the connection.
    #[error("backend {addr} refused the connection")]
    Refused { addr: SocketAddr },

    /// The attempt did not complete within the bound.
    #[error("connect to backend {addr} timed out after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },

    /// The connection was reset while being established.
    #[error("connection to backend {addr} was reset")]
    Reset { addr: SocketAddr },

    /// Any other establishment failure.
    #[error("connect to backend {addr} failed: {source}")]
    Unknown {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectError {
    /// `true` for the active-refusal case that warrants the client-facing
    /// "server offline" notification.
    pub fn is_refused(&self) -> bool {
        matches!(self, ConnectError::Refused { .. })
    }
}

/// Maps an establishment-time I/O error to a [`ConnectError`] class.
fn classify_connect_error(
    addr: SocketAddr,
    connect_timeout: Duration,
    source: std::io::Error,
) -> ConnectError {
    use std::io::ErrorKind;
    match source.kind() {
        ErrorKind::ConnectionRefused => ConnectError::Refused { addr },
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => ConnectError::Reset { addr },
        ErrorKind::TimedOut => ConnectError::Timeout {
            addr,
            timeout: connect_timeout,
        },
        _ => ConnectError::Unknown { addr, source },
    }
}

/// One established TCP connection to the backend, split into halves so the
/// reader can run as its own task while the session keeps the writer.
pub struct BackendConnection {
    pub read_half: OwnedReadHalf,
    pub write_half: OwnedWriteHalf,
}

impl BackendConnection {
    /// Attempts a single connection to `addr`, bounded by `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ConnectError`]; the caller (the session
    /// bridge) applies the reconnect policy.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Err(_) => {
                return Err(ConnectError::Timeout {
                    addr,
                    timeout: connect_timeout,
                })
            }
            Ok(Err(e)) => return Err(classify_connect_error(addr, connect_timeout, e)),
            Ok(Ok(stream)) => stream,
        };

        // Game traffic is many small packets; coalescing them adds latency
        // for no bandwidth win.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            read_half,
            write_half,
        })
    }
}

/// Spawns the reader task for an established backend connection.
///
/// The task reads chunks from the backend and sends them through the
/// returned channel.  The channel closing is the session's signal that the
/// backend is gone, whatever the cause:
///
/// - EOF (backend closed) and read errors (reset) end the task.
/// - A read that sits idle for `idle_timeout` ends the task too; a silent
///   backend is treated as dead rather than held open forever.
/// - The session dropping the receiver ends the task on its next chunk.
pub fn spawn_backend_reader(
    read_half: OwnedReadHalf,
    session_id: Uuid,
    idle_timeout: Duration,
) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        read_backend_bytes(read_half, session_id, idle_timeout, tx).await;
    });
    rx
}

async fn read_backend_bytes(
    mut read_half: OwnedReadHalf,
    session_id: Uuid,
    idle_timeout: Duration,
    tx: mpsc::Sender<Vec<u8>>,
) {
    // 4 KiB covers the vast majority of game packets; larger reads just
    // arrive as multiple chunks.
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match timeout(idle_timeout, read_half.read(&mut buf)).await {
            Err(_) => {
                debug!("session {session_id}: backend idle for {idle_timeout:?}; closing");
                break;
            }
            Ok(Ok(0)) => {
                debug!("session {session_id}: backend closed the connection (EOF)");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!("session {session_id}: backend read failed: {e}");
                break;
            }
        };

        if tx.send(buf[..n].to_vec()).await.is_err() {
            debug!("session {session_id}: session ended; stopping backend reader");
            break;
        }
    }
}

/// Writes `bytes` to the backend write half.
///
/// # Errors
///
/// Returns the I/O error on failure; the session treats this as a dropped
/// write (best-effort), not as a teardown trigger.
pub async fn write_backend(
    write_half: &mut OwnedWriteHalf,
    bytes: &[u8],
) -> std::io::Result<()> {
    // write_all: a partial OS-level write must not split a packet.
    write_half.write_all(bytes).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
