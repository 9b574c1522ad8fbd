//! Drives a real server (in-memory storage) over WebSocket and HTTP.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use pulse_api::app::{build_router, build_state, Storage};
use pulse_api::config::Config;
use pulse_core::memory::InMemoryUserProfileStore;
use pulse_core::{PresenceStatus, UserId};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn memory_config() -> Arc<Config> {
    let vars: HashMap<String, String> = [("STORAGE_BACKEND", "memory"), ("BIND_ADDRESS", "127.0.0.1:0")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Arc::new(Config::from_vars(vars).unwrap())
}

async fn spawn_server(storage: Storage) -> String {
    let (state, _writer) = build_state(memory_config(), storage).await.unwrap();
    let app = build_router(state).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> Client {
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn expect_silence(client: &mut Client) {
    let frame = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(frame.is_err(), "unexpected frame: {:?}", frame);
}

async fn register(client: &mut Client, user: &str) {
    send_json(client, json!({"type": "register", "userId": user})).await;
    let reply = next_json(client).await;
    assert_eq!(reply["type"], "registered");
    assert_eq!(reply["userId"], user);
}

#[tokio::test]
async fn message_reaches_receiver_tabs_and_echoes_to_origin() {
    let url = spawn_server(Storage::in_memory()).await;
    let mut a1 = connect(&url).await;
    let mut a2 = connect(&url).await;
    let mut b1 = connect(&url).await;
    let mut b2 = connect(&url).await;
    register(&mut a1, "A").await;
    register(&mut a2, "A").await;
    register(&mut b1, "B").await;
    register(&mut b2, "B").await;

    send_json(
        &mut a1,
        json!({"type": "send_message", "senderId": "A", "receiverId": "B", "text": "hi"}),
    )
    .await;

    let echo = next_json(&mut a1).await;
    assert_eq!(echo["type"], "message_sent");
    assert_eq!(echo["message"]["text"], "hi");
    assert_eq!(echo["message"]["conversationId"], "A_B");
    assert_eq!(echo["message"]["read"], false);

    for b in [&mut b1, &mut b2] {
        let received = next_json(b).await;
        assert_eq!(received["type"], "receive_message");
        assert_eq!(received["message"]["id"], echo["message"]["id"]);
    }
    expect_silence(&mut a2).await;
}

#[tokio::test]
async fn empty_message_is_reported_to_sender_only() {
    let url = spawn_server(Storage::in_memory()).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    register(&mut a, "A").await;
    register(&mut b, "B").await;

    send_json(
        &mut a,
        json!({"type": "send_message", "senderId": "A", "receiverId": "B", "text": "  "}),
    )
    .await;
    let reply = next_json(&mut a).await;
    assert_eq!(reply["type"], "error");
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn presence_follows_first_and_last_connection() {
    let profiles = Arc::new(InMemoryUserProfileStore::new());
    profiles.seed(&UserId::from("A"), PresenceStatus::Online);
    let storage = Storage {
        profiles: profiles.clone(),
        ..Storage::in_memory()
    };
    let url = spawn_server(storage).await;
    // Stale flag was reset before the server started listening.
    assert_eq!(profiles.status_of(&UserId::from("A")), Some(PresenceStatus::Offline));

    let mut tab1 = connect(&url).await;
    let mut tab2 = connect(&url).await;
    register(&mut tab1, "A").await;
    register(&mut tab2, "A").await;

    tab1.close(None).await.unwrap();
    drop(tab1);
    tab2.close(None).await.unwrap();
    drop(tab2);

    let mut waited = 0;
    while profiles.writes_for(&UserId::from("A")).len() < 3 && waited < 50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += 1;
    }
    assert_eq!(
        profiles.writes_for(&UserId::from("A")),
        vec![PresenceStatus::Offline, PresenceStatus::Online, PresenceStatus::Offline]
    );
}

#[tokio::test]
async fn rest_history_and_mark_read() {
    let storage = Storage::in_memory();
    let (state, _writer) = build_state(memory_config(), storage).await.unwrap();
    let hub = state.hub.clone();
    let app = build_router(state).unwrap();

    let origin = pulse_core::SessionId::new();
    hub.register(origin, UserId::from("B")).await.unwrap();
    for text in ["one", "two"] {
        hub.send_message(origin, UserId::from("B"), UserId::from("A"), text.to_string())
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(Request::get("/api/messages/A/B").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let history: Value = serde_json::from_slice(&body).unwrap();
    let texts: Vec<_> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["one", "two"]);

    let mark = || {
        Request::post("/api/messages/read")
            .header("content-type", "application/json")
            .body(Body::from(json!({"userId": "A", "otherUserId": "B"}).to_string()))
            .unwrap()
    };
    let first: Value = {
        let response = app.clone().oneshot(mark()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes()).unwrap()
    };
    assert_eq!(first, json!({"success": true, "updated": 2}));

    let second: Value = {
        let response = app.clone().oneshot(mark()).await.unwrap();
        serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes()).unwrap()
    };
    assert_eq!(second["updated"], 0);

    let response = app
        .clone()
        .oneshot(Request::get("/api/messages/unread/A/B").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let unread: Value =
        serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes()).unwrap();
    assert_eq!(unread["count"], 0);

    let response = app
        .oneshot(Request::get("/api/presence/B").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let presence: Value =
        serde_json::from_slice(&response.into_body().collect().await.unwrap().to_bytes()).unwrap();
    assert_eq!(presence["status"], "online");
    assert_eq!(presence["sessions"], 1);
}
