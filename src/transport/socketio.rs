//! socket.io Session over WebSocket
//!
//! Single responsibility: keep a socket.io v4 session alive on one endpoint and
//! turn its frames into listener dispatches.
//!
//! # Lifecycle
//!
//! 1. `open()` connects the WebSocket, waits for the engine.io open packet, and
//!    asks to join the default namespace. It returns once a link task owns the
//!    socket.
//! 2. The link task answers pings, writes queued emits, and dispatches events.
//!    The server's namespace reply becomes the local `connect` event.
//! 3. When the link drops, listeners see `disconnect`. With reconnection
//!    enabled the task reopens the link with capped exponential backoff and a
//!    fresh `connect` fires; otherwise the session is closed.
//!
//! Emits are queued, so an emit made while the link is down is written after
//! the next successful reopen.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::protocol::{decode, encode, OpenInfo, Packet, SocketPacket};
use super::registry::ListenerRegistry;
use super::{Listener, ListenerId, Transport};
use crate::error::{ClientError, Result};
use crate::events;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tuning for a socket.io session.
#[derive(Debug, Clone)]
pub struct SocketIoOptions {
    /// Reopen the link when it drops
    pub reconnection: bool,
    /// Delay before the first reconnection attempt
    pub reconnection_delay: Duration,
    /// Upper bound for the backoff delay
    pub reconnection_delay_max: Duration,
    /// Reconnection attempts per outage (None = unlimited)
    pub reconnection_attempts: Option<u32>,
    /// Bound on connecting the WebSocket and receiving the open packet
    pub connect_timeout: Duration,
}

impl Default for SocketIoOptions {
    fn default() -> Self {
        Self {
            reconnection: true,
            reconnection_delay: Duration::from_secs(1),
            reconnection_delay_max: Duration::from_secs(5),
            reconnection_attempts: None,
            connect_timeout: Duration::from_secs(20),
        }
    }
}

struct Shared {
    listeners: ListenerRegistry,
    closed: AtomicBool,
    shutdown: Notify,
}

impl Shared {
    /// Mark closed and drop listeners. Returns false if already closed.
    fn shut(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.listeners.clear();
        true
    }
}

/// A socket.io session on one endpoint.
pub struct SocketIoTransport {
    url: String,
    options: SocketIoOptions,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl SocketIoTransport {
    /// Prepare a session for `endpoint` (an `http(s)://` or `ws(s)://` server
    /// URL). Nothing is connected until [`Transport::open`].
    pub fn new(endpoint: &str, options: SocketIoOptions) -> Result<Self> {
        let url = socket_url(endpoint)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            url,
            options,
            shared: Arc::new(Shared {
                listeners: ListenerRegistry::new(),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        })
    }

    /// WebSocket URL this session connects to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    async fn open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let outbound_rx = self
            .outbound_rx
            .lock()
            .take()
            .ok_or_else(|| ClientError::Transport("session already opened".into()))?;

        info!(url = %self.url, "Opening socket.io session");
        let (ws, open_info) = match open_link(&self.url, self.options.connect_timeout).await {
            Ok(link) => link,
            Err(e) => {
                error!(url = %self.url, error = %e, "Failed to open socket.io session");
                *self.outbound_rx.lock() = Some(outbound_rx);
                return Err(e);
            }
        };

        tokio::spawn(run_session(
            Arc::clone(&self.shared),
            self.url.clone(),
            self.options.clone(),
            ws,
            open_info,
            outbound_rx,
        ));
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
        let frame = encode(&Packet::event(event, payload))?;
        debug!(event = %event, "Queueing emit");
        self.outbound.send(frame).map_err(|_| ClientError::Closed)
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(url = %self.url, "Closing socket.io session");
        self.shared
            .listeners
            .dispatch(events::DISCONNECT, &Value::String("client close".into()));
        self.shared.listeners.clear();
        self.shared.shutdown.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        // The link task exits on its own once signalled
        self.shared.shut();
        self.shared.shutdown.notify_one();
    }
}

/// How a link ended.
enum LinkEnd {
    /// We closed the session
    Closed,
    /// The server or network dropped the link
    Dropped(String),
}

/// Connect the WebSocket, read the open packet, and request the default namespace.
async fn open_link(url: &str, limit: Duration) -> Result<(WsStream, OpenInfo)> {
    let (mut ws, _) = timeout(limit, connect_async(url))
        .await
        .map_err(|_| ClientError::Transport(format!("timed out connecting to {}", url)))?
        .map_err(|e| ClientError::Transport(format!("WebSocket connect failed: {}", e)))?;

    let open_info = timeout(limit, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => match decode(&text) {
                    Ok(Packet::Open(info)) => return Ok(info),
                    Ok(other) => debug!(packet = ?other, "Ignoring packet before open"),
                    Err(e) => return Err(e),
                },
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::from(e)),
            }
        }
    })
    .await
    .map_err(|_| ClientError::Transport("timed out waiting for open packet".into()))??;

    let connect = encode(&Packet::Message(SocketPacket::Connect(None)))?;
    ws.send(Message::Text(connect)).await?;

    debug!(sid = %open_info.sid, "engine.io session opened");
    Ok((ws, open_info))
}

/// Own the session until it is closed or cannot be restored.
async fn run_session(
    shared: Arc<Shared>,
    url: String,
    options: SocketIoOptions,
    mut ws: WsStream,
    mut open_info: OpenInfo,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    loop {
        let reason = match drive_link(&shared, ws, &open_info, &mut outbound).await {
            LinkEnd::Closed => break,
            LinkEnd::Dropped(reason) => reason,
        };
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        warn!(url = %url, reason = %reason, "socket.io link dropped");
        shared
            .listeners
            .dispatch(events::DISCONNECT, &Value::String(reason));

        if !options.reconnection {
            shared.shut();
            break;
        }
        match reconnect(&shared, &url, &options).await {
            Some((next_ws, next_info)) => {
                ws = next_ws;
                open_info = next_info;
            }
            None => {
                shared.shut();
                break;
            }
        }
    }
    debug!(url = %url, "socket.io session task ended");
}

/// Reopen the link with capped exponential backoff.
/// Returns None when attempts run out or the session is closed meanwhile.
async fn reconnect(
    shared: &Shared,
    url: &str,
    options: &SocketIoOptions,
) -> Option<(WsStream, OpenInfo)> {
    let mut attempt: u32 = 0;
    loop {
        if let Some(max) = options.reconnection_attempts {
            if attempt >= max {
                error!(url = %url, attempts = attempt, "Giving up on reconnection");
                return None;
            }
        }
        let delay = backoff_delay(options, attempt);
        attempt += 1;

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shared.shutdown.notified() => return None,
        }
        if shared.closed.load(Ordering::SeqCst) {
            return None;
        }

        info!(url = %url, attempt = attempt, "Reconnecting socket.io session");
        match open_link(url, options.connect_timeout).await {
            Ok(link) => return Some(link),
            Err(e) => warn!(url = %url, attempt = attempt, error = %e, "Reconnection failed"),
        }
    }
}

fn backoff_delay(options: &SocketIoOptions, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    options
        .reconnection_delay
        .saturating_mul(factor)
        .min(options.reconnection_delay_max)
}

/// The server pings every interval; silence past interval + timeout means a
/// dead link.
fn liveness_window(open_info: &OpenInfo) -> Duration {
    Duration::from_millis(
        open_info
            .ping_interval
            .saturating_add(open_info.ping_timeout),
    )
}

/// Pump one link until it ends.
async fn drive_link(
    shared: &Shared,
    ws: WsStream,
    open_info: &OpenInfo,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> LinkEnd {
    let (mut sink, mut stream) = ws.split();

    let liveness = liveness_window(open_info);
    let watchdog = sleep(liveness);
    tokio::pin!(watchdog);

    loop {
        tokio::select! {
            _ = shared.shutdown.notified() => {
                if let Ok(frame) = encode(&Packet::Message(SocketPacket::Disconnect)) {
                    let _ = sink.send(Message::Text(frame)).await;
                }
                let _ = sink.close().await;
                return LinkEnd::Closed;
            }
            _ = &mut watchdog => {
                return LinkEnd::Dropped("ping timeout".into());
            }
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        return LinkEnd::Dropped(format!("write failed: {}", e));
                    }
                }
                None => return LinkEnd::Closed,
            },
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        return LinkEnd::Dropped(format!("server closed: {:?}", frame));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return LinkEnd::Dropped(format!("WebSocket error: {}", e)),
                    None => return LinkEnd::Dropped("stream ended".into()),
                };

                let packet = match decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(error = %e, "Skipping undecodable frame");
                        continue;
                    }
                };

                match packet {
                    Packet::Ping => {
                        // An unrepresentable deadline leaves the far-future one in place
                        if let Some(deadline) = Instant::now().checked_add(liveness) {
                            watchdog.as_mut().reset(deadline);
                        }
                        if let Ok(pong) = encode(&Packet::Pong) {
                            if let Err(e) = sink.send(Message::Text(pong)).await {
                                return LinkEnd::Dropped(format!("write failed: {}", e));
                            }
                        }
                    }
                    Packet::Close => return LinkEnd::Dropped("server closed session".into()),
                    Packet::Message(SocketPacket::Connect(data)) => {
                        debug!("Joined default namespace");
                        shared
                            .listeners
                            .dispatch(events::CONNECT, &data.unwrap_or(Value::Null));
                    }
                    Packet::Message(SocketPacket::Event { name, payload }) => {
                        let delivered = shared.listeners.dispatch(&name, &payload);
                        debug!(event = %name, listeners = delivered, "Dispatched event");
                    }
                    Packet::Message(SocketPacket::Disconnect) => {
                        return LinkEnd::Dropped("server disconnected namespace".into());
                    }
                    Packet::Message(SocketPacket::ConnectError(data)) => {
                        error!(error = %data, "Server refused namespace connection");
                        return LinkEnd::Dropped(format!("connect error: {}", data));
                    }
                    Packet::Open(_) | Packet::Pong | Packet::Noop => {}
                }
            }
        }
    }
}

/// socket.io WebSocket URL for a server endpoint.
pub fn socket_url(endpoint: &str) -> Result<String> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ClientError::Transport(format!("invalid endpoint '{}': {}", endpoint, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::Transport(format!(
                "unsupported endpoint scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Transport(format!("cannot use endpoint '{}'", endpoint)))?;
    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.into())
}
