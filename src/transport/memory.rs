//! In-process loopback transport.
//!
//! `MemoryTransport::pair()` returns the client half (a [`Transport`]) and a
//! [`MemoryServer`] that scripts the other side: it sees every client emit and
//! can push events to the client. Opening the client half fires the local
//! `connect` event immediately.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::registry::ListenerRegistry;
use super::{Listener, ListenerId, Transport};
use crate::error::{ClientError, Result};
use crate::events;

struct Shared {
    listeners: ListenerRegistry,
    closed: AtomicBool,
    opens: AtomicUsize,
}

/// Client half of a loopback session.
pub struct MemoryTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<(String, Value)>,
}

/// Server half of a loopback session.
pub struct MemoryServer {
    shared: Arc<Shared>,
    inbound: Mutex<mpsc::UnboundedReceiver<(String, Value)>>,
}

impl MemoryTransport {
    pub fn pair() -> (Arc<MemoryTransport>, MemoryServer) {
        let shared = Arc::new(Shared {
            listeners: ListenerRegistry::new(),
            closed: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
        });
        let (outbound, inbound) = mpsc::unbounded_channel();
        (
            Arc::new(MemoryTransport {
                shared: shared.clone(),
                outbound,
            }),
            MemoryServer {
                shared,
                inbound: Mutex::new(inbound),
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.listeners.dispatch(events::CONNECT, &Value::Null);
        Ok(())
    }

    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.shared.listeners.on(event, listener)
    }

    fn once(&self, event: &str, listener: Listener) -> ListenerId {
        self.shared.listeners.once(event, listener)
    }

    fn off(&self, event: &str) {
        self.shared.listeners.off(event);
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.outbound
            .send((event.to_string(), payload))
            .map_err(|_| ClientError::Closed)
    }

    fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!("Loopback session closed");
            self.shared.listeners.dispatch(events::DISCONNECT, &Value::Null);
            self.shared.listeners.clear();
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl MemoryServer {
    /// Push `event` to the client. Returns how many client listeners ran;
    /// nothing is delivered once the session is closed.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.shared.listeners.dispatch(event, &payload)
    }

    /// Simulate the link dropping and coming back: fires `disconnect` then
    /// `connect` on the client.
    pub fn reconnect(&self) {
        if self.is_closed() {
            return;
        }
        self.shared.listeners.dispatch(events::DISCONNECT, &Value::Null);
        self.shared.listeners.dispatch(events::CONNECT, &Value::Null);
    }

    /// Drop the session from the server side. The client sees `disconnect`
    /// and the session closes for good.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!("Loopback session dropped by server");
            self.shared.listeners.dispatch(events::DISCONNECT, &Value::Null);
            self.shared.listeners.clear();
        }
    }

    /// Next event the client emitted, or `None` once the client half is dropped.
    pub async fn recv(&self) -> Option<(String, Value)> {
        self.inbound.lock().await.recv().await
    }

    /// An already-emitted client event, without waiting.
    pub async fn try_recv(&self) -> Option<(String, Value)> {
        self.inbound.lock().await.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// How many times the client opened the session.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Listeners the client currently has for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared.listeners.listener_count(event)
    }
}
