//! Request/response over broadcast.
//!
//! The server answers nothing directly; it broadcasts state. A
//! [`PendingRequest`] waits for the next broadcast of one event and turns it into
//! a value, bounded by an optional timeout. Each request owns its own single-use
//! listener, so concurrent requests for the same event never interfere, and a
//! request that times out or is dropped removes exactly its own listener.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::transport::{ListenerId, Transport};

/// An in-flight wait for one broadcast.
pub struct PendingRequest {
    transport: Arc<dyn Transport>,
    event: String,
    listener: ListenerId,
    receiver: oneshot::Receiver<Value>,
    timeout: Option<Duration>,
}

impl PendingRequest {
    /// Start listening for the next `event`. `timeout` of `None` waits forever.
    pub fn register(
        transport: Arc<dyn Transport>,
        event: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if transport.is_closed() {
            return Err(ClientError::Closed);
        }

        let (tx, receiver) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let listener = transport.once(
            event,
            Arc::new(move |payload| {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(payload);
                }
            }),
        );

        Ok(Self {
            transport,
            event: event.to_string(),
            listener,
            receiver,
            timeout,
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Wait for the broadcast.
    ///
    /// # Errors
    /// - `Timeout` if the window elapses first; the session stays open
    /// - `Closed` if the session closes while waiting
    pub async fn wait(mut self) -> Result<Value> {
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.receiver).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(event = %self.event, timeout_ms = limit.as_millis() as u64, "Request timed out");
                    return Err(ClientError::Timeout {
                        event: self.event.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => (&mut self.receiver).await,
        };

        // A dropped sender means the session cleared its listeners on close
        received.map_err(|_| ClientError::Closed)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        // No-op when the listener already fired
        self.transport.remove_listener(self.listener);
    }
}

/// Wait for the next `event` on `transport`, bounded by `timeout`.
pub async fn await_event(
    transport: &Arc<dyn Transport>,
    event: &str,
    timeout: Option<Duration>,
) -> Result<Value> {
    PendingRequest::register(Arc::clone(transport), event, timeout)?
        .wait()
        .await
}
