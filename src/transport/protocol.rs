//! socket.io Wire Protocol
//!
//! Single responsibility: Encode and decode socket.io v4 text packets carried in
//! engine.io v4 frames. Binary attachments and acknowledgements are not used by
//! the channel protocol and are rejected.
//!
//! # Wire Format
//!
//! Every WebSocket text frame is one engine.io packet:
//!
//! ```text
//! 0{"sid":"..","upgrades":[],"pingInterval":25000,"pingTimeout":20000}   open
//! 1                                                                      close
//! 2 / 3                                                                  ping / pong
//! 4<socket.io packet>                                                    message
//! 6                                                                      noop
//! ```
//!
//! A socket.io packet on the default namespace:
//!
//! ```text
//! 0[{..}]                   connect (server reply carries {"sid": ..})
//! 1                         disconnect
//! 2["event", arg0, ...]     event
//! 4{"message": ".."}        connect error
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Session parameters sent by the server in the open packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// An engine.io packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

/// A socket.io packet on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    /// Event name plus its first argument (`Null` when sent without arguments).
    Event { name: String, payload: Value },
    ConnectError(Value),
}

impl Packet {
    pub fn event(name: &str, payload: Value) -> Self {
        Packet::Message(SocketPacket::Event {
            name: name.to_string(),
            payload,
        })
    }
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ClientError::Protocol("empty frame".into()))?;
    let body = chars.as_str();

    match kind {
        '0' => serde_json::from_str(body)
            .map(Packet::Open)
            .map_err(|e| ClientError::Protocol(format!("bad open packet: {}", e))),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(body).map(Packet::Message),
        '6' => Ok(Packet::Noop),
        other => Err(ClientError::Protocol(format!(
            "unsupported engine.io packet type '{}'",
            other
        ))),
    }
}

fn decode_socket_packet(body: &str) -> Result<SocketPacket> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ClientError::Protocol("empty socket.io packet".into()))?;
    let data = strip_namespace(chars.as_str());

    match kind {
        '0' => {
            if data.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                parse_json(data).map(|v| SocketPacket::Connect(Some(v)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            // Skip an acknowledgement id if the server asked for one
            let data = data.trim_start_matches(|c: char| c.is_ascii_digit());
            decode_event(data)
        }
        '4' => parse_json(data).map(SocketPacket::ConnectError),
        other => Err(ClientError::Protocol(format!(
            "unsupported socket.io packet type '{}'",
            other
        ))),
    }
}

/// Drop a `/namespace,` prefix. Only the default namespace is joined.
fn strip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        match data.find(',') {
            Some(comma) => &data[comma + 1..],
            None => "",
        }
    } else {
        data
    }
}

fn decode_event(data: &str) -> Result<SocketPacket> {
    let value = parse_json(data)?;
    let mut args = match value {
        Value::Array(args) => args.into_iter(),
        other => {
            return Err(ClientError::Protocol(format!(
                "event packet is not an array: {}",
                other
            )))
        }
    };

    let name = match args.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(ClientError::Protocol(
                "event packet has no event name".into(),
            ))
        }
    };
    let payload = args.next().unwrap_or(Value::Null);

    Ok(SocketPacket::Event { name, payload })
}

fn parse_json(data: &str) -> Result<Value> {
    serde_json::from_str(data)
        .map_err(|e| ClientError::Protocol(format!("bad packet payload: {}", e)))
}

/// Encode one packet as a text frame.
pub fn encode(packet: &Packet) -> Result<String> {
    let frame = match packet {
        Packet::Open(info) => format!(
            "0{}",
            serde_json::to_string(info)
                .map_err(|e| ClientError::Protocol(format!("bad open packet: {}", e)))?
        ),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Noop => "6".to_string(),
        Packet::Message(SocketPacket::Connect(None)) => "40".to_string(),
        Packet::Message(SocketPacket::Connect(Some(data))) => format!("40{}", data),
        Packet::Message(SocketPacket::Disconnect) => "41".to_string(),
        Packet::Message(SocketPacket::Event { name, payload }) => {
            let args = if payload.is_null() {
                Value::Array(vec![Value::String(name.clone())])
            } else {
                Value::Array(vec![Value::String(name.clone()), payload.clone()])
            };
            format!("42{}", args)
        }
        Packet::Message(SocketPacket::ConnectError(data)) => format!("44{}", data),
    };
    Ok(frame)
}
