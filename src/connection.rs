//! Connection handle returned by [`crate::connect`].

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::timeout_from_ms;
use crate::error::Result;
use crate::events;
use crate::pending::await_event;
use crate::resolver::Endpoint;
use crate::transport::{Listener, ListenerId, Transport};

/// A joined channel.
///
/// The channel and endpoint are fixed for the life of the connection; the only
/// thing that changes is whether the session is still open. Cloning shares the
/// same session.
#[derive(Clone)]
pub struct Connection {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    channel: String,
    timeout_ms: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("channel", &self.channel)
            .field("endpoint", &self.endpoint)
            .field("timeout_ms", &self.timeout_ms)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
        channel: String,
        timeout_ms: u64,
    ) -> Self {
        Self {
            transport,
            endpoint,
            channel,
            timeout_ms,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Accessor timeout in milliseconds (0 = disabled).
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    fn timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.timeout_ms)
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.transport.on(event, Arc::new(listener) as Listener)
    }

    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.transport.once(event, Arc::new(listener) as Listener)
    }

    /// Remove every listener for `event`, including the connection's own.
    ///
    /// The join handshake listens on `connect`, `needPassword`, and
    /// `setPermissions` for the life of the session. Calling `off` on one of
    /// those stops the automatic rejoin after a reconnect; use
    /// [`remove_listener`](Self::remove_listener) to drop only your own.
    pub fn off(&self, event: &str) {
        self.transport.off(event);
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.transport.remove_listener(id)
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Next `changeMedia` broadcast: the media now playing.
    pub async fn get_current_media(&self) -> Result<Value> {
        await_event(&self.transport, events::CHANGE_MEDIA, self.timeout()).await
    }

    /// Next `playlist` broadcast.
    pub async fn get_playlist(&self) -> Result<Value> {
        await_event(&self.transport, events::PLAYLIST, self.timeout()).await
    }

    /// Next `userlist` broadcast.
    pub async fn get_userlist(&self) -> Result<Value> {
        await_event(&self.transport, events::USERLIST, self.timeout()).await
    }

    /// Callback form of [`Connection::get_current_media`].
    pub fn get_current_media_with<F>(&self, callback: F)
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let this = self.clone();
        complete_with(async move { this.get_current_media().await }, callback);
    }

    /// Callback form of [`Connection::get_playlist`].
    pub fn get_playlist_with<F>(&self, callback: F)
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let this = self.clone();
        complete_with(async move { this.get_playlist().await }, callback);
    }

    /// Callback form of [`Connection::get_userlist`].
    pub fn get_userlist_with<F>(&self, callback: F)
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let this = self.clone();
        complete_with(async move { this.get_userlist().await }, callback);
    }
}

/// Drive `operation` on the runtime and hand its result to `callback`.
///
/// Must be called from within a tokio runtime.
pub(crate) fn complete_with<T, Fut, F>(operation: Fut, callback: F)
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    F: FnOnce(Result<T>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(operation.await);
    });
}
