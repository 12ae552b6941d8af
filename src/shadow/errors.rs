//! Errors raised by the shadow request queue and client.

use crate::error::ErrorClass;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShadowError {
    #[error("Invalid shadow request: {message}")]
    Validation { message: String },

    #[error("{action} request failed for {target} (request {token})", target = .target.as_deref().unwrap_or("<none>"))]
    ProtocolFailure {
        action: String,
        target: Option<String>,
        token: String,
    },

    #[error("Shadow queue invariant violated: {message}")]
    InternalConsistency { message: String },

    #[error("{action} request discarded by queue reset")]
    QueueReset { action: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Channel closed: {component}")]
    ChannelClosed { component: String },
}

impl ShadowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn protocol_failure(
        action: impl Into<String>,
        target: Option<&str>,
        token: impl Into<String>,
    ) -> Self {
        Self::ProtocolFailure {
            action: action.into(),
            target: target.map(str::to_string),
            token: token.into(),
        }
    }

    pub fn internal_consistency(message: impl Into<String>) -> Self {
        Self::InternalConsistency {
            message: message.into(),
        }
    }

    pub fn queue_reset(action: impl Into<String>) -> Self {
        Self::QueueReset {
            action: action.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn channel_closed(component: impl Into<String>) -> Self {
        Self::ChannelClosed {
            component: component.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Validation,
            Self::ProtocolFailure { .. } => ErrorClass::Protocol,
            Self::InternalConsistency { .. } => ErrorClass::InternalConsistency,
            Self::QueueReset { .. } | Self::Transport { .. } | Self::ChannelClosed { .. } => {
                ErrorClass::Infrastructure
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class().is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_failure_display() {
        let err = ShadowError::protocol_failure("update", Some("pod"), "client-7");
        assert_eq!(err.to_string(), "update request failed for pod (request client-7)");

        let err = ShadowError::protocol_failure("publish", None, "client-8");
        assert_eq!(err.to_string(), "publish request failed for <none> (request client-8)");
    }

    #[test]
    fn test_only_consistency_errors_are_fatal() {
        assert!(ShadowError::internal_consistency("token mismatch").is_fatal());
        assert!(!ShadowError::queue_reset("get").is_fatal());
        assert!(!ShadowError::validation("thing name required").is_fatal());
        assert_eq!(ShadowError::transport("broken pipe").class(), ErrorClass::Infrastructure);
    }
}
