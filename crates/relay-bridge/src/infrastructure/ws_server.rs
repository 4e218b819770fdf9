//! WebSocket server: accept loop and the per-session relay bridge.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming connections from browsers and upgrading each to a
//!    WebSocket session.
//! 3. Running one bridge event loop per session that:
//!    - opens a TCP connection to the fixed backend,
//!    - routes the first client message through the handshake inspector,
//!    - copies bytes in both directions (client frames → backend stream,
//!      backend chunks → binary client frames),
//!    - re-attempts the backend connection a bounded number of times when it
//!      drops while the client is still connected,
//!    - tears down both sides exactly once, whichever side dies first.
//! 4. Registering every session in the [`SessionRegistry`] so process
//!    shutdown can close them all.
//!
//! # One event loop per session
//!
//! Each session is a single `tokio::select!` loop over four event sources:
//! the client WebSocket, the backend reader channel, the pending reconnect
//! timer, and the registry's close signal.  Keeping the loop single-tasked
//! (plus the backend reader task it owns) means the session state machine in
//! [`SessionLifecycle`] is driven from one place, which is what makes the
//! reconnect accounting and the close-exactly-once guarantee easy to uphold.
//! Sessions share no mutable state with each other; one slow or failing
//! session never affects the others or the accept loop.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relay_core::protocol::handshake::inspect_first_packet;
use relay_core::protocol::versions;

use crate::application::ingress::encode_control;
use crate::domain::config::RelayConfig;
use crate::domain::messages::{ClientIngress, ClientNotice, ControlEnvelope};
use crate::domain::session::{ReconnectDecision, SessionLifecycle};
use crate::infrastructure::backend::{
    spawn_backend_reader, write_backend, BackendConnection, ConnectError,
};
use crate::infrastructure::registry::{SessionHandle, SessionRegistry};

/// Write half of a client WebSocket, after splitting.
type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the configured listen address and runs the accept loop until
/// `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (port in use,
/// missing permission).
pub async fn run_server(
    config: RelayConfig,
    registry: Arc<SessionRegistry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.listen_addr))?;
    run_with_listener(listener, config, registry, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind port 0 and learn the
/// actual port before starting the loop.
pub async fn run_with_listener(
    listener: TcpListener,
    config: RelayConfig,
    registry: Arc<SessionRegistry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    info!(
        "relay listening on {} (backend {})",
        listener.local_addr()?,
        config.backend_addr
    );

    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout on accept() so the loop can poll the shutdown flag
        // even when no browsers are connecting.
        let accept_result = timeout(Duration::from_millis(200), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, peer_addr))) => {
                info!("new client connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let reg = Arc::clone(&registry);

                tokio::spawn(async move {
                    handle_client_session(stream, peer_addr, cfg, reg).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep the listener alive.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout: no new connection in the last 200 ms.
            }
        }
    }

    // Deterministic shutdown: ask every registered session to close, then
    // wait for them to unregister.
    let active = registry.len().await;
    if active > 0 {
        info!("closing {active} active session(s)");
    }
    registry.shutdown_all().await;
    if !registry.await_drained(Duration::from_secs(5)).await {
        warn!("shutdown timed out waiting for sessions to close");
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point for each per-session task.  Wraps [`run_session`] and logs
/// the outcome so errors never escape the task.
async fn handle_client_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
) {
    match run_session(raw_stream, peer_addr, config, registry).await {
        Ok(()) => info!("session {peer_addr} closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Upgrades the connection, registers the session, runs the bridge, and
/// unregisters on the way out.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let session_id = Uuid::new_v4();
    info!("session {session_id}: established for {peer_addr}");

    let close = Arc::new(Notify::new());
    registry
        .insert(
            session_id,
            SessionHandle {
                peer_addr,
                close: Arc::clone(&close),
            },
        )
        .await;

    relay_session(ws_stream, session_id, config, close).await;

    // Terminal teardown: leave the registry so shutdown does not wait on us.
    registry.remove(&session_id).await;
    Ok(())
}

// ── The bridge event loop ─────────────────────────────────────────────────────

/// Runs one client session from WebSocket establishment to teardown.
///
/// Transport errors are handled here and never propagate; the only
/// externally observable effects are the JSON notices sent to the client and
/// the eventual close of both transports.
async fn relay_session(
    ws_stream: WebSocketStream<TcpStream>,
    session_id: Uuid,
    config: Arc<RelayConfig>,
    close: Arc<Notify>,
) {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let mut lifecycle = SessionLifecycle::new(config.max_reconnects);
    let mut backend_write: Option<OwnedWriteHalf> = None;
    let mut backend_rx: Option<mpsc::Receiver<Vec<u8>>> = None;
    let mut reconnect_at: Option<Instant> = None;
    let mut dropped_writes: u64 = 0;

    // Advisory "the relay is up" signal, sent before the backend attempt
    // resolves.
    send_notice(&mut ws_tx, session_id, &ClientNotice::proxy_ready()).await;

    // Initial backend connection attempt.
    let mut give_up = false;
    match BackendConnection::connect(config.backend_addr, config.idle_timeout).await {
        Ok(conn) => {
            info!("session {session_id}: connected to backend {}", config.backend_addr);
            backend_write = Some(conn.write_half);
            backend_rx = Some(spawn_backend_reader(
                conn.read_half,
                session_id,
                config.idle_timeout,
            ));
            lifecycle.on_backend_connected();
            send_notice(&mut ws_tx, session_id, &ClientNotice::connected()).await;
        }
        Err(e) => {
            give_up = !handle_connect_failure(
                &e,
                session_id,
                &config,
                &mut lifecycle,
                &mut ws_tx,
                &mut reconnect_at,
            )
            .await;
        }
    }

    while !give_up {
        // Select guards cannot reference the same variables the futures
        // borrow, so snapshot them first.
        let backend_alive = backend_rx.is_some();
        let reconnect_pending = reconnect_at.is_some();
        let reconnect_deadline =
            reconnect_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            // Process shutdown (or any external close request).
            _ = close.notified() => {
                debug!("session {session_id}: close requested");
                break;
            }

            // Client → backend.
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        let keep_going = handle_client_frame(
                            msg,
                            session_id,
                            &config,
                            &mut lifecycle,
                            &mut ws_tx,
                            &mut backend_write,
                            &mut dropped_writes,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                        debug!("session {session_id}: client WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("session {session_id}: client WebSocket error: {e}");
                        break;
                    }
                    None => {
                        debug!("session {session_id}: client stream ended");
                        break;
                    }
                }
            }

            // Backend → client.
            chunk = recv_backend(&mut backend_rx), if backend_alive => {
                match chunk {
                    Some(bytes) => {
                        if ws_tx.send(WsMessage::Binary(bytes)).await.is_err() {
                            debug!("session {session_id}: client send failed (disconnected)");
                            break;
                        }
                    }
                    None => {
                        // EOF, reset, or idle timeout: the reader task ended.
                        debug!("session {session_id}: backend connection lost");
                        drop(backend_write.take());
                        backend_rx = None;
                        let keep_going = schedule_reconnect(
                            session_id,
                            &config,
                            &mut lifecycle,
                            &mut ws_tx,
                            &mut reconnect_at,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                }
            }

            // Backoff elapsed: try the backend again.  The attempt itself is
            // bounded by the idle timeout, and a close request fires on the
            // next loop iteration thanks to Notify's stored permit.
            _ = tokio::time::sleep_until(reconnect_deadline), if reconnect_pending => {
                reconnect_at = None;
                debug!("session {session_id}: reconnecting to backend");
                match BackendConnection::connect(config.backend_addr, config.idle_timeout).await {
                    Ok(conn) => {
                        info!("session {session_id}: backend reconnected");
                        backend_write = Some(conn.write_half);
                        backend_rx = Some(spawn_backend_reader(
                            conn.read_half,
                            session_id,
                            config.idle_timeout,
                        ));
                        lifecycle.on_backend_connected();
                        send_notice(&mut ws_tx, session_id, &ClientNotice::connected()).await;
                    }
                    Err(e) => {
                        let keep_going = handle_connect_failure(
                            &e,
                            session_id,
                            &config,
                            &mut lifecycle,
                            &mut ws_tx,
                            &mut reconnect_at,
                        )
                        .await;
                        if !keep_going {
                            break;
                        }
                    }
                }
            }
        }
    }

    // Symmetric teardown, guarded so it runs exactly once per session no
    // matter which event got us here.
    if lifecycle.begin_close() {
        // Sends a Close frame if the client is still reachable; ignore
        // failures on an already-gone peer.
        let _ = ws_tx.close().await;
        // Dropping the halves closes the backend TCP connection; the reader
        // task (if any) ends on its next read.
        drop(backend_write.take());
        drop(backend_rx.take());
        info!(
            "session {session_id}: closed (reconnects used: {}, dropped writes: {dropped_writes})",
            lifecycle.reconnect_count()
        );
    }
}

/// Receives the next backend chunk, or stays pending when no backend
/// connection exists (the select guard keeps this branch disabled then).
async fn recv_backend(rx: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ── Event handlers ────────────────────────────────────────────────────────────

/// Handles one frame from the client.  Returns `false` when the session
/// should end (client sent Close).
async fn handle_client_frame(
    msg: WsMessage,
    session_id: Uuid,
    config: &RelayConfig,
    lifecycle: &mut SessionLifecycle,
    ws_tx: &mut WsSink,
    backend_write: &mut Option<OwnedWriteHalf>,
    dropped_writes: &mut u64,
) -> bool {
    // Classify the frame exactly once; downstream code only sees the union.
    let ingress: ClientIngress = match msg {
        WsMessage::Binary(data) => ClientIngress::Binary(data),

        WsMessage::Text(text) => {
            if !config.json_ingress {
                debug!("session {session_id}: text frame ignored (JSON ingress disabled)");
                return true;
            }
            match serde_json::from_str::<ControlEnvelope>(&text) {
                Ok(envelope) => ClientIngress::Control(envelope),
                Err(e) => {
                    // One bad message does not end the session.
                    warn!("session {session_id}: invalid control envelope: {e}");
                    return true;
                }
            }
        }

        WsMessage::Ping(data) => {
            // Protocol-level ping; tokio-tungstenite replies automatically.
            debug!("session {session_id}: WebSocket ping ({} bytes)", data.len());
            return true;
        }
        WsMessage::Pong(_) => {
            debug!("session {session_id}: WebSocket pong received");
            return true;
        }
        WsMessage::Close(_) => {
            debug!("session {session_id}: WebSocket Close frame received");
            return false;
        }
        WsMessage::Frame(_) => {
            debug!("session {session_id}: raw frame (ignored)");
            return true;
        }
    };

    match ingress {
        ClientIngress::Binary(data) => {
            let payload = if lifecycle.note_first_message() {
                inspect_and_report(data, session_id, config, ws_tx).await
            } else {
                data
            };
            forward_to_backend(backend_write, &payload, session_id, dropped_writes).await;
        }

        ClientIngress::Control(envelope) => match encode_control(&envelope) {
            Ok(bytes) => {
                forward_to_backend(backend_write, &bytes, session_id, dropped_writes).await;
            }
            Err(e) => {
                warn!("session {session_id}: control envelope translation failed: {e}");
            }
        },
    }

    true
}

/// Runs the first binary message of the session through the handshake
/// inspector, reports the declared version to the client, and returns the
/// bytes to forward.
async fn inspect_and_report(
    data: Vec<u8>,
    session_id: Uuid,
    config: &RelayConfig,
    ws_tx: &mut WsSink,
) -> Vec<u8> {
    let outcome = inspect_first_packet(&data, config.min_protocol_version);

    if let Some(declared) = outcome.declared_version {
        let effective = if outcome.rewritten {
            config.min_protocol_version
        } else {
            declared
        };

        if outcome.rewritten {
            info!(
                "session {session_id}: client declared {}; patched to {}",
                versions::describe(declared),
                versions::describe(effective)
            );
        } else {
            info!(
                "session {session_id}: client declared {}",
                versions::describe(declared)
            );
        }

        let notice = ClientNotice::Init {
            declared_protocol: declared,
            effective_protocol: effective,
            version_label: versions::describe(effective),
        };
        send_notice(ws_tx, session_id, &notice).await;
    } else {
        debug!("session {session_id}: first message is not a handshake; forwarding as-is");
    }

    outcome.into_bytes()
}

/// Writes bytes to the backend if a connection exists; otherwise counts the
/// message as dropped.  Best-effort either way.
async fn forward_to_backend(
    backend_write: &mut Option<OwnedWriteHalf>,
    bytes: &[u8],
    session_id: Uuid,
    dropped_writes: &mut u64,
) {
    match backend_write {
        Some(write_half) => {
            if let Err(e) = write_backend(write_half, bytes).await {
                debug!(
                    "session {session_id}: backend write failed ({e}); dropped {} byte(s)",
                    bytes.len()
                );
                *dropped_writes += 1;
            }
        }
        None => {
            debug!(
                "session {session_id}: no backend connection; dropped {} byte(s)",
                bytes.len()
            );
            *dropped_writes += 1;
        }
    }
}

/// Applies the reconnect policy after a failed connect attempt, sending the
/// "server offline" notice first when the backend actively refused.
/// Returns `false` when the session should close.
async fn handle_connect_failure(
    err: &ConnectError,
    session_id: Uuid,
    config: &RelayConfig,
    lifecycle: &mut SessionLifecycle,
    ws_tx: &mut WsSink,
    reconnect_at: &mut Option<Instant>,
) -> bool {
    warn!("session {session_id}: backend connect failed: {err}");
    if err.is_refused() {
        send_notice(ws_tx, session_id, &ClientNotice::server_offline()).await;
    }
    schedule_reconnect(session_id, config, lifecycle, ws_tx, reconnect_at).await
}

/// Consumes one unit of the reconnect budget and arms the backoff timer, or
/// reports that the budget is spent.  Returns `false` when the session
/// should close.
async fn schedule_reconnect(
    session_id: Uuid,
    config: &RelayConfig,
    lifecycle: &mut SessionLifecycle,
    ws_tx: &mut WsSink,
    reconnect_at: &mut Option<Instant>,
) -> bool {
    match lifecycle.on_backend_lost() {
        ReconnectDecision::Retry { attempt } => {
            info!(
                "session {session_id}: reconnect attempt {attempt}/{} in {:?}",
                config.max_reconnects, config.reconnect_backoff
            );
            send_notice(
                ws_tx,
                session_id,
                &ClientNotice::reconnecting(attempt, config.max_reconnects),
            )
            .await;
            *reconnect_at = Some(Instant::now() + config.reconnect_backoff);
            true
        }
        ReconnectDecision::GiveUp => {
            info!("session {session_id}: reconnect budget exhausted; closing");
            false
        }
    }
}

/// Serializes a notice and sends it as a text frame.  Best-effort: a failed
/// send is logged, never escalated (the session notices a dead client
/// through its read side).
async fn send_notice(ws_tx: &mut WsSink, session_id: Uuid, notice: &ClientNotice) {
    match serde_json::to_string(notice) {
        Ok(json) => {
            if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                debug!("session {session_id}: notice send failed (client disconnected)");
            }
        }
        Err(e) => {
            error!("session {session_id}: notice serialization error: {e}");
        }
    }
}
