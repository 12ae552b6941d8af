//! Shadow protocol requests and correlation tokens.

use super::errors::ShadowError;
use crate::constants::shadow as protocol;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// The five shadow protocol actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowAction {
    Get,
    Update,
    Register,
    Unregister,
    Publish,
}

impl ShadowAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => protocol::ACTION_GET,
            Self::Update => protocol::ACTION_UPDATE,
            Self::Register => protocol::ACTION_REGISTER,
            Self::Unregister => protocol::ACTION_UNREGISTER,
            Self::Publish => protocol::ACTION_PUBLISH,
        }
    }

    /// Whether the transport acknowledges this action with a correlated status.
    /// `unregister` and `publish` are fire-and-forget.
    pub fn expects_ack(self) -> bool {
        matches!(self, Self::Get | Self::Update | Self::Register)
    }
}

impl fmt::Display for ShadowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadowAction {
    type Err = ShadowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            protocol::ACTION_GET => Ok(Self::Get),
            protocol::ACTION_UPDATE => Ok(Self::Update),
            protocol::ACTION_REGISTER => Ok(Self::Register),
            protocol::ACTION_UNREGISTER => Ok(Self::Unregister),
            protocol::ACTION_PUBLISH => Ok(Self::Publish),
            other => Err(ShadowError::validation(format!(
                "request action invalid: '{other}'"
            ))),
        }
    }
}

/// An outbound shadow operation
#[derive(Debug, Clone, PartialEq)]
pub enum ShadowRequest {
    Get { thing_name: String },
    /// `state` is the update document, `{"reported": ...}`
    Update { thing_name: String, state: Value },
    Register { thing_name: String },
    Unregister { thing_name: String },
    Publish { topic: String, message: String },
}

impl ShadowRequest {
    pub fn get(thing_name: impl Into<String>) -> Self {
        Self::Get {
            thing_name: thing_name.into(),
        }
    }

    /// Report `state` as the thing's reported state. `None` clears the
    /// previously reported state.
    pub fn update(thing_name: impl Into<String>, state: Option<Value>) -> Self {
        Self::Update {
            thing_name: thing_name.into(),
            state: json!({ "reported": state.unwrap_or(Value::Null) }),
        }
    }

    pub fn register(thing_name: impl Into<String>) -> Self {
        Self::Register {
            thing_name: thing_name.into(),
        }
    }

    pub fn unregister(thing_name: impl Into<String>) -> Self {
        Self::Unregister {
            thing_name: thing_name.into(),
        }
    }

    /// Publish `message` serialized as JSON
    pub fn publish(topic: impl Into<String>, message: &Value) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.to_string(),
        }
    }

    pub fn action(&self) -> ShadowAction {
        match self {
            Self::Get { .. } => ShadowAction::Get,
            Self::Update { .. } => ShadowAction::Update,
            Self::Register { .. } => ShadowAction::Register,
            Self::Unregister { .. } => ShadowAction::Unregister,
            Self::Publish { .. } => ShadowAction::Publish,
        }
    }

    /// Thing name, or topic for `publish`
    pub fn target(&self) -> &str {
        match self {
            Self::Get { thing_name }
            | Self::Update { thing_name, .. }
            | Self::Register { thing_name }
            | Self::Unregister { thing_name } => thing_name,
            Self::Publish { topic, .. } => topic,
        }
    }

    /// Structural checks applied before a request is enqueued
    pub fn validate(&self) -> Result<(), ShadowError> {
        match self {
            Self::Update { state, .. } if state.is_null() => {
                return Err(ShadowError::validation(
                    "update field is required for update action",
                ));
            }
            // A JSON null serializes to "null" and carries nothing to publish
            Self::Publish { message, .. } if message.is_empty() || message == "null" => {
                return Err(ShadowError::validation(
                    "message is required for publish action",
                ));
            }
            _ => {}
        }

        if self.action() != ShadowAction::Publish && self.target().trim().is_empty() {
            return Err(ShadowError::validation(format!(
                "thingName required for {} action",
                self.action()
            )));
        }
        Ok(())
    }
}

/// Per-client monotonic request id, `<client_id>-<n>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn new(client_id: &str, sequence: u64) -> Self {
        Self(format!("{client_id}-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for CorrelationToken {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl From<CorrelationToken> for String {
    fn from(token: CorrelationToken) -> Self {
        token.0
    }
}
