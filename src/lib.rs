//! Async client for CyTube channels.
//!
//! A CyTube server only broadcasts: there is no request/response. This crate
//! joins a channel (answering the password prompt if there is one) and turns
//! the broadcasts the server sends to members into bounded, awaitable lookups.
//!
//! # Architecture
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `config`     | Connection settings and their defaults                  |
//! | `resolver`   | Channel name → socket server via the socket config API  |
//! | `transport`  | The pub/sub session capability and its implementations  |
//! | `handshake`  | Join / password state machine                           |
//! | `pending`    | One broadcast → one awaitable value, with a timeout     |
//! | `connection` | The handle callers hold                                 |
//! | `client`     | `connect` and friends                                   |
//!
//! # Example
//!
//! ```rust,no_run
//! use cytube_client::{connect, ConnectionSettings};
//!
//! # async fn example() -> Result<(), cytube_client::ClientError> {
//! // Defaults: secure server, auto-reconnect, 10s accessor timeout
//! let channel = connect("movies").await?;
//! let media = channel.get_current_media().await?;
//! println!("now playing: {}", media["title"]);
//!
//! channel.on("chatMsg", |msg| println!("{}: {}", msg["username"], msg["msg"]));
//!
//! // Password-protected channel, no accessor timeout
//! let private = connect(
//!     ConnectionSettings::new("private-room")
//!         .with_password("hunter2")
//!         .with_timeout_ms(0),
//! )
//! .await?;
//! let users = private.get_userlist().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod handshake;
pub mod pending;
pub mod resolver;
pub mod transport;

pub use client::{connect, connect_with, establish, establish_with};
pub use config::{
    ConnectionSettings, DEFAULT_CONFIG_BASE_URL, DEFAULT_MAX_PASSWORD_ATTEMPTS,
    DEFAULT_TIMEOUT_MS,
};
pub use connection::Connection;
pub use error::{ClientError, Result};
pub use handshake::HandshakeState;
pub use pending::{await_event, PendingRequest};
pub use resolver::{resolve, Endpoint};
pub use transport::{Listener, ListenerId, MemoryServer, MemoryTransport, Transport};
