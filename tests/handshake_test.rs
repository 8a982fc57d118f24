//! Connection handshake tests against a scripted loopback server.

mod common;

use common::{endpoint, init_tracing, open_channel, serve, settings};
use cytube_client::{
    establish, establish_with, ClientError, ConnectionSettings, MemoryServer, MemoryTransport,
    Transport,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

fn pair() -> (Arc<MemoryTransport>, Arc<MemoryServer>) {
    init_tracing();
    let (client, server) = MemoryTransport::pair();
    (client, Arc::new(server))
}

/// Last value observed by a server script.
#[derive(Default)]
struct Slot(Mutex<Option<Value>>);

impl Slot {
    fn set(&self, value: Value) {
        *self.0.lock().unwrap() = Some(value);
    }

    fn get(&self) -> Option<Value> {
        self.0.lock().unwrap().clone()
    }
}

/// Prompts for a password after every join and every password submission.
fn always_prompt(counter: Arc<AtomicUsize>) -> impl Fn(&MemoryServer, &str, &Value) + Send {
    move |server: &MemoryServer, event: &str, _: &Value| match event {
        "joinChannel" => {
            server.emit("needPassword", Value::Null);
        }
        "channelPassword" => {
            counter.fetch_add(1, Ordering::SeqCst);
            server.emit("needPassword", Value::Null);
        }
        _ => {}
    }
}

// =============================================================================
// Join
// =============================================================================

#[tokio::test]
async fn test_connect_resolves_with_requested_channel() {
    let (client, server) = pair();
    serve(Arc::clone(&server), open_channel);

    let connection = establish(settings(), endpoint(), client).await.unwrap();

    assert_eq!(connection.channel(), "test");
    assert_eq!(connection.timeout_ms(), 10_000);
    assert_eq!(connection.endpoint(), &endpoint());
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_connect_keeps_supplied_timeout() {
    let (client, server) = pair();
    serve(Arc::clone(&server), open_channel);

    let connection = establish(settings().with_timeout_ms(2500), endpoint(), client)
        .await
        .unwrap();
    assert_eq!(connection.timeout_ms(), 2500);
}

#[tokio::test]
async fn test_join_carries_channel_name() {
    let (client, server) = pair();
    let join = Arc::new(Slot::default());
    let seen = Arc::clone(&join);
    serve(Arc::clone(&server), move |server, event, payload| {
        if event == "joinChannel" {
            seen.set(payload.clone());
            server.emit("setPermissions", json!({}));
        }
    });

    establish(ConnectionSettings::new("anime"), endpoint(), client)
        .await
        .unwrap();
    assert_eq!(join.get(), Some(json!({ "name": "anime" })));
}

#[tokio::test]
async fn test_connect_without_channel_is_rejected() {
    let (client, server) = pair();

    let err = establish(ConnectionSettings::new(""), endpoint(), client)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(server.open_count(), 0);
}

#[tokio::test]
async fn test_reconnect_rejoins_channel() {
    let (client, server) = pair();
    let joins = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&joins);
    serve(Arc::clone(&server), move |server, event, _| {
        if event == "joinChannel" {
            counted.fetch_add(1, Ordering::SeqCst);
            server.emit("setPermissions", json!({}));
        }
    });

    let connection = establish(settings(), endpoint(), client).await.unwrap();
    server.reconnect();

    tokio::time::timeout(Duration::from_secs(1), async {
        while joins.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("join should be re-sent after reconnect");
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_off_connect_stops_rejoin() {
    let (client, server) = pair();
    let joins = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&joins);
    serve(Arc::clone(&server), move |server, event, _| {
        if event == "joinChannel" {
            counted.fetch_add(1, Ordering::SeqCst);
            server.emit("setPermissions", json!({}));
        }
    });

    let connection = establish(settings(), endpoint(), client).await.unwrap();
    connection.off("connect");
    assert_eq!(server.listener_count("connect"), 0);

    server.reconnect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(joins.load(Ordering::SeqCst), 1);
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_server_drop_during_handshake_fails() {
    let (client, server) = pair();
    serve(Arc::clone(&server), |server, event, _| {
        if event == "joinChannel" {
            server.close();
        }
    });

    let err = establish(settings(), endpoint(), client).await.unwrap_err();
    assert!(matches!(err, ClientError::Closed));
}

// =============================================================================
// Password challenge
// =============================================================================

#[tokio::test]
async fn test_correct_password_sent_once() {
    let (client, server) = pair();
    let submissions = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&submissions);
    serve(Arc::clone(&server), move |server, event, payload| match event {
        "joinChannel" => {
            server.emit("needPassword", Value::Null);
        }
        "channelPassword" => {
            assert_eq!(payload, &json!("hunter2"));
            counted.fetch_add(1, Ordering::SeqCst);
            server.emit("setPermissions", json!({}));
        }
        _ => {}
    });

    let connection = establish(settings().with_password("hunter2"), endpoint(), client)
        .await
        .unwrap();

    assert_eq!(connection.channel(), "test");
    assert_eq!(submissions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_prompts_mean_wrong_password() {
    let (client, server) = pair();
    let submissions = Arc::new(AtomicUsize::new(0));
    serve(Arc::clone(&server), always_prompt(Arc::clone(&submissions)));

    let err = establish(settings().with_password("wrong"), endpoint(), client)
        .await
        .unwrap_err();

    match err {
        ClientError::Auth(msg) => assert!(msg.contains("password"), "got: {}", msg),
        other => panic!("expected auth error, got {:?}", other),
    }
    assert!(server.is_closed());
    assert_eq!(server.emit("setPermissions", json!({})), 0);
    assert_eq!(submissions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_duplicate_prompt_is_tolerated() {
    let (client, server) = pair();
    let prompts = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&prompts);
    serve(Arc::clone(&server), move |server, event, _| match event {
        "joinChannel" => {
            // The server sometimes prompts twice before reading the answer
            server.emit("needPassword", Value::Null);
            server.emit("needPassword", Value::Null);
        }
        "channelPassword" => {
            if counted.fetch_add(1, Ordering::SeqCst) == 1 {
                server.emit("setPermissions", json!({}));
            }
        }
        _ => {}
    });

    let connection = establish(settings().with_password("hunter2"), endpoint(), client).await;
    assert!(connection.is_ok());
}

#[tokio::test]
async fn test_missing_password_closes_without_submitting() {
    let (client, server) = pair();
    let submissions = Arc::new(AtomicUsize::new(0));
    serve(Arc::clone(&server), always_prompt(Arc::clone(&submissions)));

    let err = establish(settings(), endpoint(), client).await.unwrap_err();

    match err {
        ClientError::Auth(msg) => assert!(msg.contains("password required")),
        other => panic!("expected auth error, got {:?}", other),
    }
    assert!(server.is_closed());
    assert_eq!(submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_password_is_treated_as_missing() {
    let (client, server) = pair();
    let submissions = Arc::new(AtomicUsize::new(0));
    serve(Arc::clone(&server), always_prompt(Arc::clone(&submissions)));

    let err = establish(settings().with_password(""), endpoint(), client)
        .await
        .unwrap_err();

    match err {
        ClientError::Auth(msg) => assert!(msg.contains("password required"), "got: {}", msg),
        other => panic!("expected auth error, got {:?}", other),
    }
    assert!(server.is_closed());
    assert_eq!(submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_disconnect_listener_sees_auth_close() {
    let (client, server) = pair();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&disconnects);
    client.on(
        "disconnect",
        Arc::new(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
    );
    serve(Arc::clone(&server), always_prompt(Arc::new(AtomicUsize::new(0))));

    assert!(establish(settings(), endpoint(), client).await.is_err());
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Callback form
// =============================================================================

#[tokio::test]
async fn test_callback_matches_async_on_success() {
    let (client, server) = pair();
    serve(Arc::clone(&server), open_channel);

    let (tx, rx) = oneshot::channel();
    establish_with(settings(), endpoint(), client, move |result| {
        let _ = tx.send(result);
    });

    let connection = rx.await.unwrap().unwrap();
    assert_eq!(connection.channel(), "test");
}

#[tokio::test]
async fn test_callback_matches_async_on_auth_failure() {
    let (client, server) = pair();
    serve(Arc::clone(&server), always_prompt(Arc::new(AtomicUsize::new(0))));

    let (tx, rx) = oneshot::channel();
    establish_with(settings(), endpoint(), client, move |result| {
        let _ = tx.send(result);
    });

    assert!(matches!(rx.await.unwrap(), Err(ClientError::Auth(_))));
    assert!(server.is_closed());
}
