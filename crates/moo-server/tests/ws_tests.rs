//! End-to-end tests for the `WebSocket` counter endpoint.
//!
//! Each test binds a real listener on an ephemeral port and talks to it
//! with `tokio-tungstenite`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::arithmetic_side_effects)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use moo_server::config::{ServerConfig, WsConfig};
use moo_server::router::build_router;
use moo_server::state::AppState;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A client on a plain socket with a shrunken receive buffer.
type StalledClient = WebSocketStream<TcpStream>;

/// Kernel buffer size for the stalled-reader tests.
const SMALL_SOCKET_BUFFER: u32 = 4096;

async fn spawn_server(config: &ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_on(listener, config)
}

/// Serve from a listener whose accepted sockets have a small send
/// buffer, so a peer that stops reading backs up into its session
/// queue after a handful of frames.
fn spawn_server_with_small_buffers(config: &ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_send_buffer_size(SMALL_SOCKET_BUFFER).unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    serve_on(socket.listen(128).unwrap(), config)
}

fn serve_on(listener: TcpListener, config: &ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::new(config).unwrap());
    let addr = listener.local_addr().unwrap();
    let router = build_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/api/ws")).await.unwrap();
    client
}

/// Connect with a small receive buffer. The test stops polling this
/// client to play a peer that no longer reads.
async fn connect_stalled(addr: SocketAddr) -> StalledClient {
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(SMALL_SOCKET_BUFFER).unwrap();
    let stream = socket.connect(addr).await.unwrap();
    let (client, _) = client_async(format!("ws://{addr}/api/ws"), stream).await.unwrap();
    client
}

/// Read whatever is still buffered until the server ends the connection.
async fn wait_for_close(client: &mut StalledClient) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match client.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("server never closed the connection");
}

/// Increment one step at a time, letting `fast` read each update, until
/// only one session is left. Returns the last count.
async fn increment_until_one_member(state: &AppState, fast: &mut Client) -> u64 {
    let mut count = 0;
    while state.hub.registry().len() > 1 {
        count = state.hub.increment_and_broadcast();
        assert_eq!(next_text(fast).await, format!("mc|{count}"));
        assert!(count < 100_000, "stalled client was never dropped");
    }
    count
}

/// Read frames until the next text frame and return it.
async fn next_text(client: &mut Client) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let message = client.next().await.expect("stream ended").unwrap();
            if let Message::Text(text) = message {
                return text.to_string();
            }
        }
    })
    .await
    .expect("timed out waiting for a text frame")
}

/// Read frames until one equals `expected`.
async fn wait_for_text(client: &mut Client, expected: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while next_text(client).await != expected {}
    })
    .await
    .expect("never received expected frame");
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_receives_snapshot() {
    let (addr, state) = spawn_server(&ServerConfig::default()).await;
    state.hub.counter().increment();
    state.hub.counter().increment();

    let mut client = connect(addr).await;

    assert_eq!(next_text(&mut client).await, "mc|2");
}

#[tokio::test]
async fn test_increment_reaches_every_client() {
    let (addr, state) = spawn_server(&ServerConfig::default()).await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    assert_eq!(next_text(&mut a).await, "mc|0");
    assert_eq!(next_text(&mut b).await, "mc|0");

    a.send(Message::text("count_moo")).await.unwrap();

    assert_eq!(next_text(&mut a).await, "mc|1");
    assert_eq!(next_text(&mut b).await, "mc|1");
    assert_eq!(state.hub.count(), 1);
}

#[tokio::test]
async fn test_unrecognized_messages_are_ignored() {
    let (addr, state) = spawn_server(&ServerConfig::default()).await;
    let mut client = connect(addr).await;
    assert_eq!(next_text(&mut client).await, "mc|0");

    client.send(Message::text("increment")).await.unwrap();
    client.send(Message::text("hello cow")).await.unwrap();
    client.send(Message::text("count_moo")).await.unwrap();

    assert_eq!(next_text(&mut client).await, "mc|1");
    assert_eq!(state.hub.count(), 1);
}

#[tokio::test]
async fn test_disconnect_leaves_registry() {
    let (addr, state) = spawn_server(&ServerConfig::default()).await;
    let mut client = connect(addr).await;
    next_text(&mut client).await;
    wait_until(|| state.hub.registry().len() == 1).await;

    client.close(None).await.unwrap();

    wait_until(|| state.hub.registry().is_empty()).await;
}

#[tokio::test]
async fn test_dropped_connection_does_not_affect_others() {
    let (addr, state) = spawn_server(&ServerConfig::default()).await;
    let mut stayer = connect(addr).await;
    let mut leaver = connect(addr).await;
    next_text(&mut stayer).await;
    next_text(&mut leaver).await;
    wait_until(|| state.hub.registry().len() == 2).await;

    drop(leaver);
    wait_until(|| state.hub.registry().len() == 1).await;

    stayer.send(Message::text("count_moo")).await.unwrap();
    assert_eq!(next_text(&mut stayer).await, "mc|1");
}

#[tokio::test]
async fn test_http_increment_broadcasts_to_sockets() {
    let config = ServerConfig {
        allow_http_increment: true,
        ..ServerConfig::default()
    };
    let (addr, _state) = spawn_server(&config).await;
    let mut client = connect(addr).await;
    assert_eq!(next_text(&mut client).await, "mc|0");

    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{addr}/api/increment"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, serde_json::json!({"count": 1}));
    assert_eq!(next_text(&mut client).await, "mc|1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_never_lose_increments() {
    let config = ServerConfig {
        ws: WsConfig {
            outbound_buffer: 1024,
            ..WsConfig::default()
        },
        ..ServerConfig::default()
    };
    let (addr, state) = spawn_server(&config).await;

    let clients: u64 = 10;
    let per_client: u64 = 20;
    let total = clients * per_client;

    let mut tasks = Vec::new();
    for _ in 0..clients {
        tasks.push(tokio::spawn(async move {
            let mut client = connect(addr).await;
            next_text(&mut client).await;
            for _ in 0..per_client {
                client.send(Message::text("count_moo")).await.unwrap();
            }
            wait_for_text(&mut client, &format!("mc|{total}")).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(state.hub.count(), total);
}

#[tokio::test]
async fn test_idle_session_is_closed() {
    let config = ServerConfig {
        ws: WsConfig {
            idle_timeout: Some(Duration::from_millis(100)),
            ..WsConfig::default()
        },
        ..ServerConfig::default()
    };
    let (addr, state) = spawn_server(&config).await;
    let mut client = connect(addr).await;
    next_text(&mut client).await;

    wait_until(|| state.hub.registry().is_empty()).await;
}

#[tokio::test]
async fn test_stalled_reader_is_evicted_and_disconnected() {
    let config = ServerConfig {
        ws: WsConfig {
            outbound_buffer: 1,
            send_timeout: Duration::from_secs(1),
            ..WsConfig::default()
        },
        ..ServerConfig::default()
    };
    let (addr, state) = spawn_server_with_small_buffers(&config);
    let mut fast = connect(addr).await;
    let mut slow = connect_stalled(addr).await;
    assert_eq!(next_text(&mut fast).await, "mc|0");
    wait_until(|| state.hub.registry().len() == 2).await;

    let count = increment_until_one_member(&state, &mut fast).await;

    wait_for_close(&mut slow).await;
    assert_eq!(state.hub.registry().len(), 1);

    fast.send(Message::text("count_moo")).await.unwrap();
    assert_eq!(next_text(&mut fast).await, format!("mc|{}", count + 1));
}

#[tokio::test]
async fn test_send_timeout_disconnects_stalled_reader() {
    let config = ServerConfig {
        ws: WsConfig {
            outbound_buffer: 100_000,
            send_timeout: Duration::from_millis(50),
            ..WsConfig::default()
        },
        ..ServerConfig::default()
    };
    let (addr, state) = spawn_server_with_small_buffers(&config);
    let mut fast = connect(addr).await;
    let mut slow = connect_stalled(addr).await;
    assert_eq!(next_text(&mut fast).await, "mc|0");
    wait_until(|| state.hub.registry().len() == 2).await;

    let count = increment_until_one_member(&state, &mut fast).await;

    wait_for_close(&mut slow).await;
    assert_eq!(state.hub.registry().len(), 1);

    fast.send(Message::text("count_moo")).await.unwrap();
    assert_eq!(next_text(&mut fast).await, format!("mc|{}", count + 1));
}
