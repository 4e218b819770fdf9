//! End-to-end relay scenarios over loopback sockets.
//!
//! Each test stands up the real accept loop on an ephemeral port, connects a
//! real WebSocket client with tokio-tungstenite, and plays the backend with
//! a plain `TcpListener`.  No mocks: these are the same code paths the
//! production binary runs, minus the CLI.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use relay_bridge::domain::RelayConfig;
use relay_bridge::infrastructure::ws_server::run_with_listener;
use relay_bridge::infrastructure::SessionRegistry;

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Generous bound for every await in these tests.
const STEP: Duration = Duration::from_secs(5);

// ── Harness helpers ───────────────────────────────────────────────────────────

/// Config tuned for fast tests: short backoff, short connect bound.
fn test_config(backend_addr: SocketAddr) -> RelayConfig {
    RelayConfig {
        backend_addr,
        idle_timeout: Duration::from_secs(2),
        reconnect_backoff: Duration::from_millis(100),
        ..RelayConfig::default()
    }
}

/// Binds the relay on an ephemeral port and starts the accept loop.
async fn start_relay(
    mut config: RelayConfig,
) -> (SocketAddr, Arc<AtomicBool>, JoinHandle<anyhow::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listen_addr = addr;

    let running = Arc::new(AtomicBool::new(true));
    let registry = Arc::new(SessionRegistry::new());
    let task = tokio::spawn(run_with_listener(
        listener,
        config,
        registry,
        Arc::clone(&running),
    ));
    (addr, running, task)
}

async fn connect_client(addr: SocketAddr) -> ClientWs {
    let (ws, _response) = timeout(STEP, connect_async(format!("ws://{addr}")))
        .await
        .expect("connect timed out")
        .expect("WebSocket connect failed");
    ws
}

/// Next JSON text frame, skipping anything else.
async fn next_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = timeout(STEP, ws.next())
            .await
            .expect("timed out waiting for a text frame")
            .expect("stream ended while waiting for a text frame")
            .expect("WebSocket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("notice must be valid JSON");
        }
    }
}

/// Next binary frame, skipping notices.
async fn next_binary(ws: &mut ClientWs) -> Vec<u8> {
    loop {
        let msg = timeout(STEP, ws.next())
            .await
            .expect("timed out waiting for a binary frame")
            .expect("stream ended while waiting for a binary frame")
            .expect("WebSocket error");
        if let WsMessage::Binary(bytes) = msg {
            return bytes;
        }
    }
}

/// Collects JSON notices until the relay closes the connection.
async fn drain_until_close(ws: &mut ClientWs) -> Vec<Value> {
    let mut notices = Vec::new();
    loop {
        match timeout(STEP, ws.next()).await {
            Err(_) => panic!("relay did not close the session in time"),
            Ok(None) => return notices,
            Ok(Some(Err(_))) => return notices,
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                notices.push(serde_json::from_str(&text).expect("notice must be valid JSON"));
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}

/// An address that nothing is listening on (bind, read the port, drop).
async fn closed_port_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

// ── Scenario: happy path with version rewrite ─────────────────────────────────

#[tokio::test]
async fn test_happy_path_rewrites_old_handshake_and_relays_bytes() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (relay_addr, running, relay_task) = start_relay(test_config(backend.local_addr().unwrap())).await;

    let mut ws = connect_client(relay_addr).await;

    // The relay announces itself before the backend connect resolves, then
    // reports success once it does.
    let ready = next_json(&mut ws).await;
    assert_eq!(ready["type"], "handshake");
    assert_eq!(ready["status"], "proxy_ready");

    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "status");
    assert_eq!(connected["status"], "success");
    assert_eq!(connected["message"], "minecraft_connected");

    let (mut backend_conn, _) = timeout(STEP, backend.accept()).await.unwrap().unwrap();

    // First client message: protocol 46 handshake prefix plus trailing bytes.
    ws.send(WsMessage::Binary(vec![
        0x00, 0x00, 0x2E, 0x11, 0x22, 0x33, 0x44, 0x55,
    ]))
    .await
    .unwrap();

    // The inspector reports what it saw and patched.
    let init = next_json(&mut ws).await;
    assert_eq!(init["type"], "init");
    assert_eq!(init["declared_protocol"], 46);
    assert_eq!(init["effective_protocol"], 47);

    // The backend receives the patched first packet: version bytes rewritten
    // to 47, every other byte verbatim.
    let mut first = [0u8; 8];
    timeout(STEP, backend_conn.read_exact(&mut first))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, [0x00, 0x00, 0x2F, 0x11, 0x22, 0x33, 0x44, 0x55]);

    // Later messages pass through untouched.
    ws.send(WsMessage::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .await
        .unwrap();
    let mut second = [0u8; 4];
    timeout(STEP, backend_conn.read_exact(&mut second))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, [0xDE, 0xAD, 0xBE, 0xEF]);

    // Backend → client is raw bytes as binary frames, never inspected.
    backend_conn.write_all(&[0x09, 0x09, 0x09]).await.unwrap();
    assert_eq!(next_binary(&mut ws).await, vec![0x09, 0x09, 0x09]);

    running.store(false, Ordering::Relaxed);
    timeout(STEP, relay_task).await.unwrap().unwrap().unwrap();
}

// ── Scenario: current-version handshake is untouched ──────────────────────────

#[tokio::test]
async fn test_current_version_handshake_is_forwarded_byte_identical() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (relay_addr, running, relay_task) = start_relay(test_config(backend.local_addr().unwrap())).await;

    let mut ws = connect_client(relay_addr).await;
    next_json(&mut ws).await; // proxy_ready
    next_json(&mut ws).await; // connected

    let (mut backend_conn, _) = timeout(STEP, backend.accept()).await.unwrap().unwrap();

    // Protocol 47 handshake: nothing to patch.
    let handshake = vec![0x00, 0x00, 0x2F, 0x00, 0x02, b'm', b'c', 0x63, 0xDD, 0x02];
    ws.send(WsMessage::Binary(handshake.clone())).await.unwrap();

    let mut received = vec![0u8; handshake.len()];
    timeout(STEP, backend_conn.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, handshake);

    running.store(false, Ordering::Relaxed);
    timeout(STEP, relay_task).await.unwrap().unwrap().unwrap();
}

// ── Scenario: backend refused ─────────────────────────────────────────────────

#[tokio::test]
async fn test_refused_backend_notifies_client_and_closes() {
    let mut config = test_config(closed_port_addr().await);
    config.max_reconnects = 1;
    let (relay_addr, running, relay_task) = start_relay(config).await;

    let mut ws = connect_client(relay_addr).await;

    let ready = next_json(&mut ws).await;
    assert_eq!(ready["status"], "proxy_ready");

    // Initial refusal, one scheduled retry, second refusal, then close.
    let notices = drain_until_close(&mut ws).await;

    let errors: Vec<&Value> = notices.iter().filter(|n| n["type"] == "error").collect();
    assert!(!errors.is_empty(), "expected at least one error notice");
    for e in &errors {
        assert_eq!(e["code"], "server_offline");
    }

    let reconnects: Vec<&Value> = notices
        .iter()
        .filter(|n| n["status"] == "reconnecting")
        .collect();
    assert_eq!(reconnects.len(), 1, "one retry for max_reconnects=1");

    running.store(false, Ordering::Relaxed);
    timeout(STEP, relay_task).await.unwrap().unwrap().unwrap();
}

// ── Scenario: backend dies mid-session, retries are bounded ───────────────────

#[tokio::test]
async fn test_backend_loss_triggers_bounded_reconnects_then_close() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend.local_addr().unwrap();
    let (relay_addr, running, relay_task) = start_relay(test_config(backend_addr)).await;

    let mut ws = connect_client(relay_addr).await;
    next_json(&mut ws).await; // proxy_ready
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["status"], "success");

    // Kill the established connection AND stop listening, so every retry is
    // refused.
    let (backend_conn, _) = timeout(STEP, backend.accept()).await.unwrap().unwrap();
    drop(backend_conn);
    drop(backend);

    // The session schedules attempt 1 after the backoff; attempts 1-3 all
    // fail, and the relay closes the client after the third failure.
    let notices = drain_until_close(&mut ws).await;

    let attempts: Vec<i64> = notices
        .iter()
        .filter(|n| n["status"] == "reconnecting")
        .map(|n| {
            // "backend connection lost; attempt N of 3"
            let msg = n["message"].as_str().unwrap();
            msg.split("attempt ")
                .nth(1)
                .and_then(|rest| rest.split(' ').next())
                .and_then(|n| n.parse().ok())
                .expect("reconnecting notice carries the attempt number")
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3], "exactly three attempts, in order");

    running.store(false, Ordering::Relaxed);
    timeout(STEP, relay_task).await.unwrap().unwrap().unwrap();
}

// ── Scenario: JSON ingress mode ───────────────────────────────────────────────

#[tokio::test]
async fn test_json_ingress_translates_chat_and_packet_envelopes() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = test_config(backend.local_addr().unwrap());
    config.json_ingress = true;
    let (relay_addr, running, relay_task) = start_relay(config).await;

    let mut ws = connect_client(relay_addr).await;
    next_json(&mut ws).await; // proxy_ready
    next_json(&mut ws).await; // connected

    let (mut backend_conn, _) = timeout(STEP, backend.accept()).await.unwrap().unwrap();

    // chat → 0x01 + u16 length + text bytes
    ws.send(WsMessage::Text(r#"{"type":"chat","text":"hi"}"#.to_string()))
        .await
        .unwrap();
    let mut chat = [0u8; 5];
    timeout(STEP, backend_conn.read_exact(&mut chat))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chat, [0x01, 0x00, 0x02, b'h', b'i']);

    // packet → base64-decoded, verbatim ("AAEC" = 0x00 0x01 0x02)
    ws.send(WsMessage::Text(
        r#"{"type":"packet","data":"AAEC"}"#.to_string(),
    ))
    .await
    .unwrap();
    let mut packet = [0u8; 3];
    timeout(STEP, backend_conn.read_exact(&mut packet))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(packet, [0x00, 0x01, 0x02]);

    // A malformed envelope is dropped without ending the session.
    ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
    ws.send(WsMessage::Text(
        r#"{"type":"chat","text":"still here"}"#.to_string(),
    ))
    .await
    .unwrap();
    let mut after = [0u8; 13];
    timeout(STEP, backend_conn.read_exact(&mut after))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&after[..3], &[0x01, 0x00, 0x0A]);
    assert_eq!(&after[3..], b"still here");

    running.store(false, Ordering::Relaxed);
    timeout(STEP, relay_task).await.unwrap().unwrap().unwrap();
}

// ── Scenario: shutdown closes sessions, cancelling pending backoff ────────────

#[tokio::test]
async fn test_shutdown_closes_waiting_session() {
    // Backend refused; a long backoff leaves the session parked on its
    // reconnect timer when shutdown arrives.
    let mut config = test_config(closed_port_addr().await);
    config.reconnect_backoff = Duration::from_secs(60);
    let (relay_addr, running, relay_task) = start_relay(config).await;

    let mut ws = connect_client(relay_addr).await;
    let ready = next_json(&mut ws).await;
    assert_eq!(ready["status"], "proxy_ready");
    let offline = next_json(&mut ws).await;
    assert_eq!(offline["code"], "server_offline");

    // Request shutdown while the session is sleeping out its backoff.
    running.store(false, Ordering::Relaxed);

    // The relay must close the client and exit well before the 60 s backoff.
    let notices = drain_until_close(&mut ws).await;
    assert!(
        notices.iter().all(|n| n["type"] != "init"),
        "no traffic ever flowed in this session"
    );
    timeout(STEP, relay_task).await.unwrap().unwrap().unwrap();
}
