//! End-to-end tests against a live server on an ephemeral port

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pairlink_core::{Config, CLOSE_DRAIN_TIMEOUT};
use pairlink_signal::{Relay, RelayServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    relay: Arc<Relay>,
    _pages: TempDir,
}

async fn start_server() -> TestServer {
    let pages = tempfile::tempdir().unwrap();
    std::fs::write(pages.path().join("index.html"), "<h1>pairlink</h1>").unwrap();
    std::fs::write(pages.path().join("streamer.html"), "<p>streamer</p>").unwrap();

    let mut config = Config::default();
    config.server.asset_root = pages.path().to_path_buf();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = RelayServer::new(&config);
    let relay = server.relay();
    tokio::spawn(async move { server.serve_listener(listener).await });

    TestServer {
        addr,
        relay,
        _pages: pages,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, response) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    assert_eq!(response.status().as_u16(), 101);
    ws
}

async fn wait_for_count(relay: &Relay, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.participant_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "participant count stuck at {} (expected {})",
            relay.participant_count(),
            expected
        )
    });
}

async fn next_frame(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error")
}

async fn drain(client: &mut Client) {
    while let Some(Ok(_)) = client.next().await {}
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: relay-test\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_full_session_scenario() {
    let server = start_server().await;

    let mut a = connect(server.addr).await;
    wait_for_count(&server.relay, 1).await;
    let mut b = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;

    // Third participant is turned away with a policy close.
    let mut c = connect(server.addr).await;
    match next_frame(&mut c).await {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert_eq!(u16::from(frame.code), 1008);
            assert!(frame.reason.contains("Server full"));
        }
        other => panic!("expected close frame, got {:?}", other),
    }
    drain(&mut c).await;
    assert_eq!(server.relay.participant_count(), 2);

    // An offer from A reaches B verbatim.
    let offer = r#"{"type":"signal","data":{"type":"offer","sdp":"..."}}"#;
    a.send(Message::Text(offer.into())).await.unwrap();
    assert_eq!(next_frame(&mut b).await, Message::Text(offer.into()));

    // B leaves, freeing a slot.
    b.close(None).await.unwrap();
    drain(&mut b).await;
    wait_for_count(&server.relay, 1).await;

    let _c2 = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;
}

#[tokio::test]
async fn test_silent_rejected_client_is_released() {
    let server = start_server().await;

    let _a = connect(server.addr).await;
    wait_for_count(&server.relay, 1).await;
    let _b = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;

    // A bare upgrade that never answers the close frame.
    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
        server.addr
    );
    raw.write_all(request.as_bytes()).await.unwrap();

    // A reset counts as released too, so only the timeout is fatal.
    let mut received = Vec::new();
    tokio::time::timeout(
        CLOSE_DRAIN_TIMEOUT + Duration::from_secs(5),
        raw.read_to_end(&mut received),
    )
    .await
    .expect("server kept the rejected socket open")
    .ok();

    let text = String::from_utf8_lossy(&received);
    assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    // Close frame carrying status 1008
    assert!(received.windows(2).any(|w| w == [0x03, 0xf0]));
    assert_eq!(server.relay.participant_count(), 2);
}

#[tokio::test]
async fn test_unsupported_websocket_version_not_upgraded() {
    let server = start_server().await;

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n",
        server.addr
    );
    raw.write_all(request.as_bytes()).await.unwrap();

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), raw.read_to_end(&mut received))
        .await
        .expect("server neither answered nor closed")
        .ok();

    assert!(!String::from_utf8_lossy(&received).starts_with("HTTP/1.1 101"));
    assert_eq!(server.relay.participant_count(), 0);
}

#[tokio::test]
async fn test_abrupt_disconnect_frees_slot() {
    let server = start_server().await;

    let mut a = connect(server.addr).await;
    wait_for_count(&server.relay, 1).await;
    let b = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;

    // Drop the TCP stream without a close handshake.
    drop(b);
    wait_for_count(&server.relay, 1).await;

    let mut c = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;

    a.send(Message::Text("after reconnect".into())).await.unwrap();
    assert_eq!(
        next_frame(&mut c).await,
        Message::Text("after reconnect".into())
    );
}

#[tokio::test]
async fn test_relay_is_bidirectional_and_never_echoes() {
    let server = start_server().await;

    let mut viewer = connect(server.addr).await;
    wait_for_count(&server.relay, 1).await;
    let mut streamer = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;

    let request = r#"{"type":"request_offer"}"#;
    viewer.send(Message::Text(request.into())).await.unwrap();
    assert_eq!(next_frame(&mut streamer).await, Message::Text(request.into()));

    let answer = r#"{"type":"signal","data":{"type":"answer","sdp":"v=0"}}"#;
    streamer.send(Message::Text(answer.into())).await.unwrap();
    assert_eq!(next_frame(&mut viewer).await, Message::Text(answer.into()));

    // Nothing else arrives at the sender.
    let echoed = tokio::time::timeout(Duration::from_millis(200), streamer.next()).await;
    assert!(echoed.is_err(), "sender received an unexpected frame");
}

#[tokio::test]
async fn test_opaque_binary_payload_forwarded() {
    let server = start_server().await;

    let mut a = connect(server.addr).await;
    wait_for_count(&server.relay, 1).await;
    let mut b = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;

    let payload = vec![0x00, 0x9f, 0x92, 0x96, 0xff];
    a.send(Message::Binary(payload.clone())).await.unwrap();
    assert_eq!(next_frame(&mut b).await, Message::Binary(payload));

    a.send(Message::Text("definitely { not json".into())).await.unwrap();
    assert_eq!(
        next_frame(&mut b).await,
        Message::Text("definitely { not json".into())
    );
}

#[tokio::test]
async fn test_lone_participant_keeps_connection() {
    let server = start_server().await;

    let mut alone = connect(server.addr).await;
    wait_for_count(&server.relay, 1).await;

    alone
        .send(Message::Text(r#"{"type":"request_offer"}"#.into()))
        .await
        .unwrap();

    // Still admitted and still able to talk once a peer shows up.
    let mut peer = connect(server.addr).await;
    wait_for_count(&server.relay, 2).await;
    alone.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(next_frame(&mut peer).await, Message::Text("hello".into()));
}

#[tokio::test]
async fn test_concurrent_admissions_capped_at_two() {
    let server = start_server().await;

    let clients = futures_util::future::join_all((0..3).map(|_| connect(server.addr))).await;

    let mut rejected = 0;
    let mut kept = Vec::new();
    for mut client in clients {
        match tokio::time::timeout(Duration::from_millis(500), client.next()).await {
            Ok(Some(Ok(Message::Close(Some(frame))))) => {
                assert_eq!(frame.code, CloseCode::Policy);
                rejected += 1;
            }
            Ok(other) => panic!("unexpected frame: {:?}", other),
            Err(_) => kept.push(client),
        }
    }

    assert_eq!(rejected, 1);
    assert_eq!(kept.len(), 2);
    assert_eq!(server.relay.participant_count(), 2);
}

#[tokio::test]
async fn test_pages_served_on_same_port() {
    let server = start_server().await;

    let index = http_get(server.addr, "/").await;
    assert!(index.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(index.contains("Content-Type: text/html\r\n"));
    assert!(index.ends_with("<h1>pairlink</h1>"));

    let streamer = http_get(server.addr, "/streamer.html").await;
    assert!(streamer.ends_with("<p>streamer</p>"));

    let missing = http_get(server.addr, "/viewer.html").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(missing.ends_with("404 Not Found"));

    // Page traffic never touches the registry.
    assert_eq!(server.relay.participant_count(), 0);
}
