use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley_broker::BrokerConfig;
use parley_server::{router, AppState, Config};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_server() -> TestServer {
    let config = Config {
        broker: BrokerConfig {
            url: "redis://127.0.0.1:1".into(),
            connect_timeout_ms: 200,
            publish_timeout_ms: 200,
            ..Default::default()
        },
        ..Default::default()
    };

    let state = AppState::initialize(config).await;
    let app = router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        state,
        shutdown: Some(shutdown_tx),
    }
}

async fn connect(server: &TestServer) -> Client {
    let url = format!("ws://{}/ws", server.addr);
    let (mut ws, _) = connect_async(url).await.expect("connect");
    let welcome = next_frame(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    assert!(welcome["clientId"].as_u64().is_some());
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.expect("send");
}

async fn next_frame(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");

        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

async fn expect_silence(ws: &mut Client) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(Duration::from_millis(300), ws.next()).await {
        panic!("unexpected frame: {text}");
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.expect("connect http");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.expect("read response");

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
    (status, serde_json::from_str(body).expect("json body"))
}

#[tokio::test]
async fn chat_flow_with_unreachable_broker() {
    let server = start_server().await;
    let mut alice = connect(&server).await;
    let mut bob = connect(&server).await;

    send(&mut alice, json!({"type": "setUsername", "username": "alice"})).await;
    let accepted = next_frame(&mut alice).await;
    assert_eq!(accepted, json!({"type": "usernameAccepted", "username": "alice"}));
    let list = next_frame(&mut alice).await;
    assert_eq!(list["type"], "userList");
    assert_eq!(list["count"], 1);

    let joined = next_frame(&mut bob).await;
    assert_eq!(joined["type"], "userJoined");
    assert_eq!(joined["username"], "alice");
    assert_eq!(next_frame(&mut bob).await["type"], "userList");

    send(&mut bob, json!({"type": "setUsername", "username": "alice"})).await;
    let error = next_frame(&mut bob).await;
    assert_eq!(error["type"], "error");
    assert_eq!(
        error["message"],
        "This username is already taken. Please choose another."
    );

    send(&mut bob, json!({"type": "setUsername", "username": "alice2"})).await;
    assert_eq!(next_frame(&mut bob).await["type"], "usernameAccepted");
    let list = next_frame(&mut bob).await;
    assert_eq!(list["count"], 2);
    assert_eq!(next_frame(&mut alice).await["type"], "userJoined");
    assert_eq!(next_frame(&mut alice).await["type"], "userList");

    send(&mut alice, json!({"type": "message", "message": "hi"})).await;
    for ws in [&mut alice, &mut bob] {
        let chat = next_frame(ws).await;
        assert_eq!(chat["type"], "message");
        assert_eq!(chat["username"], "alice");
        assert_eq!(chat["message"], "hi");
        assert!(chat["userId"].as_u64().is_some());
        assert!(chat["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    let (status, users) = http_get(server.addr, "/api/users").await;
    assert_eq!(status, 200);
    assert_eq!(users["service"], "users-api");
    assert_eq!(users["count"], 2);

    let (status, messages) = http_get(server.addr, "/api/messages/recent?limit=5").await;
    assert_eq!(status, 200);
    assert_eq!(messages["data"][0]["text"], "hi");
    assert_eq!(messages["data"][0]["username"], "alice");

    let (status, missing) = http_get(server.addr, "/api/users/999").await;
    assert_eq!(status, 404);
    assert_eq!(missing["service"], "users-api");

    alice.close(None).await.expect("close");
    let left = next_frame(&mut bob).await;
    assert_eq!(left["type"], "userLeft");
    assert_eq!(left["message"], "alice left the chat");
    let list = next_frame(&mut bob).await;
    assert_eq!(list["count"], 1);
    assert_eq!(list["users"][0]["username"], "alice2");
}

#[tokio::test]
async fn chat_requires_username() {
    let server = start_server().await;
    let mut anon = connect(&server).await;
    let mut dave = connect(&server).await;

    send(&mut dave, json!({"type": "setUsername", "username": "dave"})).await;
    next_frame(&mut dave).await;
    next_frame(&mut dave).await;
    // userJoined and userList reach the unnamed session too.
    next_frame(&mut anon).await;
    next_frame(&mut anon).await;

    // Only named sessions count as active users.
    let (status, index) = http_get(server.addr, "/api").await;
    assert_eq!(status, 200);
    assert_eq!(index["activeUsers"], 1);

    send(&mut anon, json!({"type": "message", "message": "hello?"})).await;
    let error = next_frame(&mut anon).await;
    assert_eq!(error["type"], "error");
    expect_silence(&mut dave).await;

    anon.send(Message::Text("{not json".into())).await.expect("send");
    assert_eq!(next_frame(&mut anon).await["type"], "error");
}

#[tokio::test]
async fn unnamed_disconnect_is_silent() {
    let server = start_server().await;
    let mut anon = connect(&server).await;
    let mut dave = connect(&server).await;

    send(&mut dave, json!({"type": "setUsername", "username": "dave"})).await;
    next_frame(&mut dave).await;
    next_frame(&mut dave).await;

    anon.close(None).await.expect("close");
    // A second close is a no-op on the client and must not disturb the server.
    let _ = anon.close(None).await;
    drop(anon);

    expect_silence(&mut dave).await;

    for _ in 0..20 {
        if server.state.hub.session_count() == 1 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(server.state.hub.session_count(), 1);
}

#[tokio::test]
async fn health_endpoint() {
    let server = start_server().await;
    let (status, body) = http_get(server.addr, "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, index) = http_get(server.addr, "/api").await;
    assert_eq!(status, 200);
    assert_eq!(index["_links"]["websocket"]["href"], "/ws");
}
