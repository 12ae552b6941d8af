//! Boundary to the device shadow transport.
//!
//! The MQTT/TLS session itself lives outside this crate. It is handed in as
//! an already-authenticated [`ShadowConnection`] plus a channel of
//! [`TransportEvent`]s carrying its lifecycle signals and acknowledgments.

use super::errors::ShadowError;
use super::request::CorrelationToken;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// Outbound half of a connected shadow transport
#[async_trait]
pub trait ShadowConnection: Send + Sync + Debug {
    /// Request the thing's shadow document; acknowledged by a `Status` event
    async fn get(&self, thing_name: &str, token: &CorrelationToken) -> Result<(), ShadowError>;

    /// Send an update document (`{"reported": ...}`); acknowledged by a `Status` event
    async fn update(
        &self,
        thing_name: &str,
        state: &Value,
        token: &CorrelationToken,
    ) -> Result<(), ShadowError>;

    /// Subscribe to the thing's shadow topics; acknowledged by a `Registered` event
    async fn register(&self, thing_name: &str, token: &CorrelationToken) -> Result<(), ShadowError>;

    async fn unregister(&self, thing_name: &str) -> Result<(), ShadowError>;

    async fn publish(&self, topic: &str, message: &str) -> Result<(), ShadowError>;

    /// Close the session; `force` skips the graceful close handshake
    async fn end(&self, force: bool) -> Result<(), ShadowError>;
}

/// Lifecycle signals and acknowledgments reported by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect,
    Reconnect,
    Close,
    Offline,
    Error(String),
    /// Acknowledgment of a `get` or `update`
    Status {
        thing_name: String,
        result: String,
        token: String,
        shadow: Value,
    },
    /// A `get` or `update` went unanswered
    Timeout { thing_name: String, token: String },
    /// The shadow was changed by another party
    ForeignStateChange {
        thing_name: String,
        operation: String,
        shadow: Value,
    },
    /// Acknowledgment of a `register`; `error` is set when it failed
    Registered {
        token: String,
        error: Option<String>,
    },
    /// A message on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    PacketSent(Vec<u8>),
    PacketReceived(Vec<u8>),
}

/// Decode a packet payload for logging: JSON when it parses, text otherwise
pub fn decode_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_payload() {
        assert_eq!(decode_payload(br#"{"state":{}}"#), json!({"state": {}}));
        assert_eq!(decode_payload(b"plain text"), json!("plain text"));
        assert_eq!(decode_payload(&[0xff, b'a']), json!("\u{fffd}a"));
    }
}
