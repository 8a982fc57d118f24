//! Publish/Subscribe Transport
//!
//! The channel protocol only needs a narrow capability from the session it runs
//! on: open it, subscribe to named events, emit named events, and close it.
//! [`Transport`] is that capability; everything above this module is written
//! against the trait so the session can be swapped.
//!
//! | Module     | Responsibility                                      |
//! |------------|-----------------------------------------------------|
//! | `registry` | Listener table shared by implementations            |
//! | `protocol` | socket.io v4 text packet codec                      |
//! | `socketio` | WebSocket-backed socket.io session                  |
//! | `memory`   | In-process loopback for scripting a server          |

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

mod registry;

pub mod memory;
pub mod protocol;
pub mod socketio;

pub use memory::{MemoryServer, MemoryTransport};
pub use registry::ListenerRegistry;
pub use socketio::{SocketIoOptions, SocketIoTransport};

/// Callback for one event payload.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle for removing one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A publish/subscribe session.
///
/// Listeners run on the transport's dispatch path and must not block.
/// Once closed, a transport drops its listeners, rejects emits, and delivers
/// nothing further.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the session. Listeners should be registered first: the local
    /// `connect` event may fire before this returns.
    async fn open(&self) -> Result<()>;

    /// Subscribe to every occurrence of `event`.
    fn on(&self, event: &str, listener: Listener) -> ListenerId;

    /// Subscribe to the next occurrence of `event` only.
    fn once(&self, event: &str, listener: Listener) -> ListenerId;

    /// Remove all listeners for `event`.
    fn off(&self, event: &str);

    /// Remove a single listener. Returns false if it was already gone.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Send `event` to the server.
    fn emit(&self, event: &str, payload: Value) -> Result<()>;

    /// Close the session. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
