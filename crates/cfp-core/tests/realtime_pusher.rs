//! Pusher connection against a local websocket server and a mock
//! channel-authorization endpoint.

use std::sync::Arc;
use std::time::Duration;

use cfp_core::ApiClient;
use cfp_core::config::{Config, env};
use cfp_core::realtime::protocol::NOTIFICATION_EVENT;
use cfp_core::realtime::{self, Broadcaster, ConnectionState, PusherConnection, RealtimeSettings};
use cfp_core::storage::MemoryTokenStorage;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn client(api: &MockServer) -> ApiClient {
    ApiClient::new(
        api.uri(),
        WAIT,
        Arc::new(MemoryTokenStorage::with_token("T")),
    )
    .unwrap()
}

fn settings(api: &MockServer, port: u16) -> RealtimeSettings {
    RealtimeSettings {
        key: "app-key".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        tls: false,
        auth_endpoint: format!("{}/broadcasting/auth", api.uri()),
        reconnect_delay: Duration::from_millis(100),
    }
}

async fn mount_channel_auth(api: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/broadcasting/auth"))
        .and(header("authorization", "Bearer T"))
        .and(body_string_contains("socket_id=1.2"))
        .and(body_string_contains("channel_name=private-App.Models.User.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"auth": "app-key:signature"})))
        .expect(times)
        .mount(api)
        .await;
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Reads frames until one with `event` arrives.
async fn expect_event(ws: &mut WebSocketStream<TcpStream>, event: &str) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                if frame["event"] == event {
                    return frame;
                }
            }
            Some(Ok(_)) => {}
            other => panic!("socket ended while waiting for {event}: {other:?}"),
        }
    }
}

async fn handshake(listener: &TcpListener, activity_timeout: u64) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    send_json(
        &mut ws,
        json!({
            "event": "pusher:connection_established",
            "data": json!({"socket_id": "1.2", "activity_timeout": activity_timeout}).to_string()
        }),
    )
    .await;
    ws
}

#[tokio::test]
async fn test_private_channel_is_authorized_and_receives_notifications() {
    let api = MockServer::start().await;
    mount_channel_auth(&api, 1).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = handshake(&listener, 30).await;
        let subscribe = expect_event(&mut ws, "pusher:subscribe").await;

        send_json(
            &mut ws,
            json!({
                "event": "pusher_internal:subscription_succeeded",
                "channel": "private-App.Models.User.1",
                "data": "{}"
            }),
        )
        .await;
        send_json(
            &mut ws,
            json!({
                "event": NOTIFICATION_EVENT,
                "channel": "private-App.Models.User.1",
                "data": json!({"id": "n1", "type": "ProposalReviewed", "message": "New review"}).to_string()
            }),
        )
        .await;

        while let Some(Ok(_)) = ws.next().await {}
        subscribe
    });

    let connection = PusherConnection::connect(settings(&api, port), client(&api)).unwrap();
    let mut receiver = connection.subscribe_private("App.Models.User.1").unwrap();

    let payload = tokio::time::timeout(WAIT, receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["id"], "n1");
    assert_eq!(payload["message"], "New review");
    assert_eq!(connection.state(), ConnectionState::Connected);

    drop(connection);
    let subscribe = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(subscribe["data"]["channel"], "private-App.Models.User.1");
    assert_eq!(subscribe["data"]["auth"], "app-key:signature");
}

#[tokio::test]
async fn test_server_ping_is_answered_and_leave_unsubscribes() {
    let api = MockServer::start().await;
    mount_channel_auth(&api, 1).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut ws = handshake(&listener, 30).await;
        expect_event(&mut ws, "pusher:subscribe").await;

        send_json(&mut ws, json!({"event": "pusher:ping", "data": {}})).await;

        let mut ponged = false;
        let mut unsubscribe = None;
        while !ponged || unsubscribe.is_none() {
            let text = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended early: {other:?}"),
            };
            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
            match frame["event"].as_str() {
                Some("pusher:pong") => ponged = true,
                Some("pusher:unsubscribe") => unsubscribe = Some(frame),
                _ => {}
            }
        }
        unsubscribe.unwrap()
    });

    let connection = PusherConnection::connect(settings(&api, port), client(&api)).unwrap();
    assert!(tokio::time::timeout(WAIT, connection.wait_connected()).await.unwrap());

    let _receiver = connection.subscribe_private("App.Models.User.1").unwrap();
    connection.leave("App.Models.User.1").unwrap();

    let unsubscribe = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(unsubscribe["data"]["channel"], "private-App.Models.User.1");
}

/// Reads until the client goes away.
async fn wait_for_close(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(message)) = ws.next().await {
        if message.is_close() {
            break;
        }
    }
}

#[tokio::test]
async fn test_dropped_socket_reconnects_and_resubscribes() {
    let api = MockServer::start().await;
    mount_channel_auth(&api, 2).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut first = handshake(&listener, 30).await;
        expect_event(&mut first, "pusher:subscribe").await;
        drop(first);

        let mut second = handshake(&listener, 30).await;
        let subscribe = expect_event(&mut second, "pusher:subscribe").await;
        send_json(
            &mut second,
            json!({
                "event": NOTIFICATION_EVENT,
                "channel": "private-App.Models.User.1",
                "data": json!({"id": "n2", "message": "After reconnect"}).to_string()
            }),
        )
        .await;

        wait_for_close(&mut second).await;
        subscribe
    });

    let connection = PusherConnection::connect(settings(&api, port), client(&api)).unwrap();
    let mut receiver = connection.subscribe_private("App.Models.User.1").unwrap();

    let payload = tokio::time::timeout(WAIT, receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["id"], "n2");

    drop(connection);
    let subscribe = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(subscribe["data"]["channel"], "private-App.Models.User.1");
    assert_eq!(subscribe["data"]["auth"], "app-key:signature");
}

#[tokio::test]
async fn test_unanswered_ping_reconnects() {
    let api = MockServer::start().await;
    mount_channel_auth(&api, 2).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut first = handshake(&listener, 1).await;
        expect_event(&mut first, "pusher:subscribe").await;
        expect_event(&mut first, "pusher:ping").await;
        // No pong: the client gives up on this socket after one more period.
        wait_for_close(&mut first).await;

        let mut second = handshake(&listener, 30).await;
        expect_event(&mut second, "pusher:subscribe").await
    });

    let connection = PusherConnection::connect(settings(&api, port), client(&api)).unwrap();
    let _receiver = connection.subscribe_private("App.Models.User.1").unwrap();

    let subscribe = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscribe["data"]["channel"], "private-App.Models.User.1");
}

#[tokio::test]
async fn test_fatal_server_error_stops_reconnecting() {
    let api = MockServer::start().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let connection = PusherConnection::connect(settings(&api, port), client(&api)).unwrap();

    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    send_json(
        &mut ws,
        json!({
            "event": "pusher:error",
            "data": {"code": 4001, "message": "Application does not exist"}
        }),
    )
    .await;
    wait_for_close(&mut ws).await;

    assert!(!tokio::time::timeout(WAIT, connection.wait_connected()).await.unwrap());
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    // Several reconnect delays pass without a new attempt.
    let retry = tokio::time::timeout(Duration::from_millis(600), listener.accept()).await;
    assert!(retry.is_err(), "client reconnected after a fatal error");

    assert!(connection.subscribe_private("App.Models.User.1").is_err());
}

#[tokio::test]
async fn test_init_installs_connection_only_with_key() {
    let api = MockServer::start().await;
    let settings = Config::default().settings_with(|_| None).unwrap();
    assert_eq!(settings.realtime.key, None);

    assert!(realtime::init(&settings, &client(&api)).is_none());
    assert!(realtime::global().is_none());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    let settings = Config::default()
        .settings_with(|name| match name {
            env::PUSHER_APP_KEY => Some("app-key".to_string()),
            env::PUSHER_HOST => Some("127.0.0.1".to_string()),
            env::PUSHER_PORT => Some(port.clone()),
            _ => None,
        })
        .unwrap();

    let connection = realtime::init(&settings, &client(&api)).unwrap();
    assert_eq!(connection.settings().key, "app-key");
    assert!(realtime::global().is_some());

    realtime::uninstall();
    assert!(realtime::global().is_none());
}
