//! Connection entry points.
//!
//! ```text
//! settings ─▶ validate ─▶ resolve endpoint ─▶ open session ─▶ handshake ─▶ Connection
//! ```
//!
//! `connect` returns only once the channel is joined. A resolution or auth
//! failure ends the attempt; call `connect` again to retry.

use std::sync::Arc;
use tracing::info;

use crate::config::ConnectionSettings;
use crate::connection::{complete_with, Connection};
use crate::error::Result;
use crate::handshake;
use crate::resolver::{resolve, Endpoint};
use crate::transport::{SocketIoOptions, SocketIoTransport, Transport};

/// Connect to a channel.
///
/// Accepts full [`ConnectionSettings`] or a bare channel name (all defaults).
///
/// # Errors
/// - `Validation` for a missing channel
/// - `Resolution` if no socket server can be found
/// - `Transport` if the session cannot be opened
/// - `Auth` if the channel password is missing or wrong
/// - `Closed` if the server drops the session during the handshake
pub async fn connect(settings: impl Into<ConnectionSettings>) -> Result<Connection> {
    let settings = settings.into();
    settings.validate()?;

    // timeout_ms bounds accessor responses only, not the config lookup
    let endpoint = resolve(&settings, &reqwest::Client::new()).await?;

    let transport = SocketIoTransport::new(
        &endpoint.url,
        SocketIoOptions {
            reconnection: settings.reconnection,
            ..Default::default()
        },
    )?;

    establish(settings, endpoint, Arc::new(transport)).await
}

/// Callback form of [`connect`]. Must be called from within a tokio runtime.
pub fn connect_with<F>(settings: impl Into<ConnectionSettings>, callback: F)
where
    F: FnOnce(Result<Connection>) + Send + 'static,
{
    complete_with(connect(settings.into()), callback);
}

/// Join a channel over a caller-supplied, not yet opened transport.
///
/// `endpoint` is recorded on the returned connection as-is; resolution is the
/// caller's business here.
pub async fn establish(
    settings: ConnectionSettings,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
) -> Result<Connection> {
    settings.validate()?;
    handshake::run(Arc::clone(&transport), &settings).await?;

    info!(channel = %settings.channel, url = %endpoint.url, "Connected");
    Ok(Connection::new(
        transport,
        endpoint,
        settings.channel,
        settings.timeout_ms,
    ))
}

/// Callback form of [`establish`]. Must be called from within a tokio runtime.
pub fn establish_with<F>(
    settings: ConnectionSettings,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    callback: F,
) where
    F: FnOnce(Result<Connection>) + Send + 'static,
{
    complete_with(establish(settings, endpoint, transport), callback);
}
