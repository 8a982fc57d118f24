//! Channel Handshake
//!
//! Single responsibility: take an opened session to the point where the channel
//! is joined and usable, or fail it.
//!
//! # Protocol
//!
//! ```text
//!   Opening ──connect──▶ Joining ──setPermissions──▶ Ready
//!                          │  ▲
//!               needPassword  │ (password sent)
//!                          ▼  │
//!                    AwaitingPassword ──needPassword (bound reached)──▶ Failed
//! ```
//!
//! The server has no join acknowledgement; `setPermissions` is the first thing
//! it sends to a member, so it is treated as one. It also never rejects a
//! password explicitly, it just prompts again. A prompt can repeat once before
//! the server has seen our answer, so the machine counts submissions and only
//! gives up when a prompt arrives after `max_password_attempts` of them.
//!
//! [`HandshakeMachine`] is the pure transition function; [`run`] wires it to a
//! transport and resolves exactly once.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::ConnectionSettings;
use crate::error::{ClientError, Result};
use crate::events;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the session to connect
    Opening,
    /// Join sent, waiting for permissions
    Joining,
    /// Password sent, waiting for permissions or another prompt
    AwaitingPassword,
    Ready,
    Failed,
}

/// Server-side occurrences the handshake reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeSignal {
    Connected,
    PasswordRequested,
    PermissionsGranted,
}

/// What the driver must do after a transition.
#[derive(Debug)]
pub enum HandshakeEffect {
    EmitJoin(Value),
    EmitPassword(String),
    Ready,
    /// Close the session and report the error
    Fail(ClientError),
}

/// Handshake state for one connection attempt.
#[derive(Debug)]
pub struct HandshakeMachine {
    channel: String,
    password: Option<String>,
    max_password_attempts: u32,
    password_attempts: u32,
    state: HandshakeState,
}

impl HandshakeMachine {
    pub fn new(settings: &ConnectionSettings) -> Self {
        Self {
            channel: settings.channel.clone(),
            // An empty password counts as none
            password: settings.password.clone().filter(|p| !p.is_empty()),
            max_password_attempts: settings.max_password_attempts,
            password_attempts: 0,
            state: HandshakeState::Opening,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn password_attempts(&self) -> u32 {
        self.password_attempts
    }

    pub fn on_signal(&mut self, signal: HandshakeSignal) -> Option<HandshakeEffect> {
        use HandshakeState::*;

        if self.state == Failed {
            return None;
        }

        match signal {
            HandshakeSignal::Connected => {
                // Rejoin on every reconnect
                if self.state != Ready {
                    self.state = Joining;
                }
                Some(HandshakeEffect::EmitJoin(json!({ "name": self.channel })))
            }
            HandshakeSignal::PermissionsGranted => {
                if self.state == Ready {
                    return None;
                }
                self.state = Ready;
                Some(HandshakeEffect::Ready)
            }
            HandshakeSignal::PasswordRequested => {
                let Some(password) = self.password.clone() else {
                    if self.state == Ready {
                        return None;
                    }
                    self.state = Failed;
                    return Some(HandshakeEffect::Fail(ClientError::Auth(
                        "password required but not provided".into(),
                    )));
                };

                // Already joined: a reconnect prompted again, answer without counting
                if self.state == Ready {
                    return Some(HandshakeEffect::EmitPassword(password));
                }

                if self.password_attempts >= self.max_password_attempts {
                    self.state = Failed;
                    return Some(HandshakeEffect::Fail(ClientError::Auth(
                        "incorrect password".into(),
                    )));
                }

                self.password_attempts += 1;
                self.state = AwaitingPassword;
                Some(HandshakeEffect::EmitPassword(password))
            }
        }
    }
}

struct Driver {
    machine: HandshakeMachine,
    transport: Weak<dyn Transport>,
    outcome: Option<oneshot::Sender<Result<()>>>,
}

/// Join the channel on `transport`, opening it, and wait until the handshake
/// settles.
///
/// The `connect` listener stays registered for the life of the session so the
/// channel is rejoined after a reconnect.
///
/// # Errors
/// - `Auth` if a password is required but missing, or keeps being re-requested
/// - `Closed` if the session ends before the handshake settles
/// - whatever `Transport::open` fails with
pub async fn run(transport: Arc<dyn Transport>, settings: &ConnectionSettings) -> Result<()> {
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let driver = Arc::new(Mutex::new(Driver {
        machine: HandshakeMachine::new(settings),
        transport: Arc::downgrade(&transport),
        outcome: Some(outcome_tx),
    }));

    for (event, signal) in [
        (events::CONNECT, HandshakeSignal::Connected),
        (events::NEED_PASSWORD, HandshakeSignal::PasswordRequested),
        (events::SET_PERMISSIONS, HandshakeSignal::PermissionsGranted),
    ] {
        let driver = Arc::clone(&driver);
        transport.on(event, Arc::new(move |_| handle(&driver, signal)));
    }
    // Listeners own the driver now; a close that drops them drops the sender
    drop(driver);

    debug!(channel = %settings.channel, "Starting channel handshake");
    if let Err(e) = transport.open().await {
        transport.close();
        return Err(e);
    }

    match outcome_rx.await {
        Ok(result) => result,
        // Every listener (and with it the sender) was dropped by a close
        Err(_) => Err(ClientError::Closed),
    }
}

fn handle(driver: &Mutex<Driver>, signal: HandshakeSignal) {
    let (effect, transport, outcome, channel) = {
        let mut driver = driver.lock();
        let effect = driver.machine.on_signal(signal);
        let settles = matches!(
            effect,
            Some(HandshakeEffect::Ready) | Some(HandshakeEffect::Fail(_))
        );
        let outcome = if settles { driver.outcome.take() } else { None };
        (
            effect,
            driver.transport.upgrade(),
            outcome,
            driver.machine.channel.clone(),
        )
    };

    let (Some(effect), Some(transport)) = (effect, transport) else {
        return;
    };

    match effect {
        HandshakeEffect::EmitJoin(payload) => {
            debug!(channel = %channel, "Joining channel");
            if let Err(e) = transport.emit(events::JOIN_CHANNEL, payload) {
                warn!(channel = %channel, error = %e, "Failed to send join");
            }
        }
        HandshakeEffect::EmitPassword(password) => {
            debug!(channel = %channel, "Submitting channel password");
            if let Err(e) = transport.emit(events::CHANNEL_PASSWORD, Value::String(password)) {
                warn!(channel = %channel, error = %e, "Failed to send password");
            }
        }
        HandshakeEffect::Ready => {
            info!(channel = %channel, "Channel joined");
            if let Some(outcome) = outcome {
                let _ = outcome.send(Ok(()));
            }
        }
        HandshakeEffect::Fail(err) => {
            warn!(channel = %channel, error = %err, "Channel handshake failed, closing session");
            if let Some(outcome) = outcome {
                let _ = outcome.send(Err(err));
            }
            transport.close();
        }
    }
}
