//! Pusher channels wire protocol (v7), as spoken by Laravel Reverb.
//!
//! Frames are JSON objects `{event, channel?, data?}`. `data` is usually a
//! JSON document encoded as a string, but some servers send it inline.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};

/// Protocol revision announced in the socket URL.
pub const PROTOCOL_VERSION: u8 = 7;

/// Event the backend uses for database/broadcast notifications.
pub const NOTIFICATION_EVENT: &str =
    "Illuminate\\Notifications\\Events\\BroadcastNotificationCreated";

const PRIVATE_PREFIX: &str = "private-";

/// Parsed server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ConnectionEstablished {
        socket_id: String,
        activity_timeout: Option<u64>,
    },
    Ping,
    Pong,
    Error {
        code: Option<u64>,
        message: String,
    },
    SubscriptionSucceeded {
        channel: String,
    },
    /// An application event on a channel.
    Event {
        channel: String,
        event: String,
        data: Value,
    },
    /// Anything else (`pusher_internal:*` we do not track, channel-less events).
    Other {
        event: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decodes `data`, which may be a JSON string holding a document.
fn decode_data(data: Option<Value>) -> Value {
    match data {
        Some(Value::String(raw)) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        Some(other) => other,
        None => Value::Null,
    }
}

/// Parses one text frame.
///
/// # Errors
/// Returns an error if the text is not a JSON object with an `event`.
pub fn parse_frame(text: &str) -> Result<Frame> {
    let raw: RawFrame = serde_json::from_str(text).context("Invalid pusher frame")?;
    let data = decode_data(raw.data);

    let frame = match raw.event.as_str() {
        "pusher:connection_established" => Frame::ConnectionEstablished {
            socket_id: data
                .get("socket_id")
                .and_then(Value::as_str)
                .context("connection_established without socket_id")?
                .to_string(),
            activity_timeout: data.get("activity_timeout").and_then(Value::as_u64),
        },
        "pusher:ping" => Frame::Ping,
        "pusher:pong" => Frame::Pong,
        "pusher:error" => Frame::Error {
            code: data.get("code").and_then(Value::as_u64),
            message: data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        },
        "pusher_internal:subscription_succeeded" => Frame::SubscriptionSucceeded {
            channel: raw.channel.unwrap_or_default(),
        },
        event if !event.starts_with("pusher") => match raw.channel {
            Some(channel) => Frame::Event {
                channel,
                event: event.to_string(),
                data,
            },
            None => Frame::Other {
                event: event.to_string(),
            },
        },
        event => Frame::Other {
            event: event.to_string(),
        },
    };

    Ok(frame)
}

/// Error codes 4000-4099 tell the client not to reconnect.
pub fn is_fatal_error(code: u64) -> bool {
    (4000..4100).contains(&code)
}

/// Wire name of a private channel. Already-prefixed names pass through.
pub fn private_channel(name: &str) -> String {
    if name.starts_with(PRIVATE_PREFIX) {
        name.to_string()
    } else {
        format!("{PRIVATE_PREFIX}{name}")
    }
}

pub fn subscribe_frame(channel: &str, auth: Option<&str>) -> String {
    let mut data = json!({ "channel": channel });
    if let Some(auth) = auth {
        data["auth"] = Value::String(auth.to_string());
    }
    json!({ "event": "pusher:subscribe", "data": data }).to_string()
}

pub fn unsubscribe_frame(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

pub fn ping_frame() -> String {
    json!({ "event": "pusher:ping", "data": {} }).to_string()
}

pub fn pong_frame() -> String {
    json!({ "event": "pusher:pong", "data": {} }).to_string()
}
