//! Bayeux message envelope (JSON).
//!
//! Known fields are typed; anything else (`ext` payloads of third-party
//! extensions, user supplied props) is kept in `extra` so it round-trips.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Server advice on how to proceed after a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<Reconnect>,
    /// Milliseconds to wait before the next connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Milliseconds the server may hold a long-poll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Advice {
    pub fn new(reconnect: Reconnect, interval: i64) -> Self {
        Self {
            reconnect: Some(reconnect),
            interval: Some(interval),
            timeout: None,
        }
    }

    /// Positive interval in milliseconds, 0 otherwise.
    pub fn interval_ms(&self) -> u64 {
        self.interval.filter(|i| *i > 0).map(|i| i as u64).unwrap_or(0)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(0)
    }
}

/// `advice.reconnect` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reconnect {
    Retry,
    Handshake,
    None,
    /// Anything the client does not understand.
    #[serde(other)]
    Unknown,
}

impl Reconnect {
    pub fn as_str(self) -> &'static str {
        match self {
            Reconnect::Retry => "retry",
            Reconnect::Handshake => "handshake",
            Reconnect::None => "none",
            Reconnect::Unknown => "unknown",
        }
    }
}

/// A Bayeux message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// `Some(Value::Null)` for an explicit `"data": null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_connection_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Value>,

    /// Set on client-synthesized failure messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<bool>,
    /// Message whose send failed (synthesized failures only).
    #[serde(skip)]
    pub request: Option<Box<Message>>,
    /// Failure reason (synthesized failures only).
    #[serde(skip)]
    pub reason: Option<String>,
    /// Set on successful `/meta/handshake` notifications.
    #[serde(skip)]
    pub reestablish: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Self::default()
        }
    }

    /// Application message carrying `data`.
    pub fn publish(channel: impl Into<String>, data: Value) -> Self {
        Self {
            channel: channel.into(),
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful == Some(true)
    }

    /// Merge user supplied props into this message. Fields already set on the
    /// message win, so props cannot override protocol fields.
    pub fn merge_props(&mut self, props: &Map<String, Value>) {
        for (k, v) in props {
            match k.as_str() {
                "ext" if self.ext.is_none() => self.ext = Some(v.clone()),
                "channel" | "id" | "clientId" | "data" | "successful" | "advice"
                | "subscription" | "supportedConnectionTypes" | "version"
                | "minimumVersion" | "connectionType" | "ext" => {}
                _ => {
                    self.extra.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
    }
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Encode a batch as the JSON array body of a Bayeux request.
pub fn encode_batch(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string(messages)?)
}

/// Decode a response body. Servers answer with an array; a single object is
/// tolerated.
pub fn decode_batch(body: &str) -> Result<Vec<Message>> {
    let value: Value = serde_json::from_str(body)?;
    let messages = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(messages)
}
