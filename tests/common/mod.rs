//! Shared helpers for scripting a loopback server.

#![allow(dead_code)]

use cytube_client::{
    establish, Connection, ConnectionSettings, Endpoint, MemoryServer, MemoryTransport,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn endpoint() -> Endpoint {
    Endpoint {
        url: "http://localhost:3000".into(),
        secure: false,
    }
}

pub fn settings() -> ConnectionSettings {
    ConnectionSettings::new("test").with_reconnection(false)
}

/// React to every client emit with `script` until the client half is dropped.
pub fn serve<F>(server: Arc<MemoryServer>, script: F) -> JoinHandle<()>
where
    F: Fn(&MemoryServer, &str, &Value) + Send + 'static,
{
    tokio::spawn(async move {
        while let Some((event, payload)) = server.recv().await {
            script(&server, &event, &payload);
        }
    })
}

/// A server that accepts every join.
pub fn open_channel(server: &MemoryServer, event: &str, _payload: &Value) {
    if event == "joinChannel" {
        server.emit("setPermissions", json!({ "chat": 0 }));
    }
}

/// A joined connection with the given accessor timeout.
pub async fn connected(timeout_ms: u64) -> (Connection, Arc<MemoryServer>) {
    init_tracing();
    let (client, server) = MemoryTransport::pair();
    let server = Arc::new(server);
    serve(Arc::clone(&server), open_channel);

    let connection = establish(settings().with_timeout_ms(timeout_ms), endpoint(), client)
        .await
        .expect("handshake should succeed");
    (connection, server)
}
