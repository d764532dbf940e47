//! Helpers shared by the integration tests: a real server on an ephemeral
//! port and a small WebSocket client speaking the JSON event protocol.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use parley_server::gateway::SqliteGateway;
use parley_server::state::{AppState, RuntimeSettings};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const PASSWORD: &str = "password123";

/// Start the server on a random port and return (base_url, addr).
pub async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");
    let gateway = Arc::new(SqliteGateway::new(db, Duration::from_secs(5)));
    let state = AppState::new(gateway, RuntimeSettings::default());

    let app = parley_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr)
}

pub async fn register_user(base_url: &str, username: &str) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/users/register", base_url))
        .json(&json!({ "username": username, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Registration failed for {}", username);
}

pub async fn create_group(base_url: &str, name: &str, creator: &str, members: &[&str]) -> Value {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/groups", base_url))
        .json(&json!({ "name": name, "creator": creator, "members": members }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Group creation failed for {}", name);
    let body: Value = resp.json().await.unwrap();
    body["group"].clone()
}

pub async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect to WebSocket");
    ws
}

pub async fn send_event(ws: &mut WsStream, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data });
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next JSON event, or None if nothing arrives within `wait`.
pub async fn next_event(ws: &mut WsStream, wait: Duration) -> Option<Value> {
    loop {
        match tokio::time::timeout(wait, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("Invalid JSON frame"));
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

/// Skip events until one matches, panicking after two seconds of silence.
pub async fn expect_event<F>(ws: &mut WsStream, what: &str, matches: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    loop {
        match next_event(ws, Duration::from_secs(2)).await {
            Some(event) if matches(&event) => return event,
            Some(_) => continue,
            None => panic!("Timed out waiting for {}", what),
        }
    }
}

pub async fn expect_named(ws: &mut WsStream, name: &str) -> Value {
    expect_event(ws, name, |event| event["event"] == name).await["data"].clone()
}

/// Assert that no event matching `matches` arrives within a short window.
pub async fn expect_none<F>(ws: &mut WsStream, what: &str, matches: F)
where
    F: Fn(&Value) -> bool,
{
    while let Some(event) = next_event(ws, Duration::from_millis(300)).await {
        assert!(!matches(&event), "Unexpected {}: {}", what, event);
    }
}

/// Connect and authenticate, returning once the group list (the last login step) arrived.
pub async fn login(addr: SocketAddr, username: &str) -> WsStream {
    let mut ws = connect(addr).await;
    send_event(&mut ws, "userLogin", json!({ "username": username })).await;
    expect_named(&mut ws, "groupList").await;
    ws
}
