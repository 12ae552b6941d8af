//! # Error Types
//!
//! Crate-level error handling. Every failure belongs to one of three classes:
//! validation errors raised at the call that introduced bad input, protocol
//! failures reported by the remote side, and internal-consistency violations
//! that mean a queue or timeline invariant was broken. Infrastructure errors
//! (closed channels, configuration) sit beside them.

use crate::config::ConfigurationError;
use crate::shadow::ShadowError;
use thiserror::Error;

/// Coarse classification used to decide how a caller may react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed input, never retried
    Validation,
    /// The remote side explicitly rejected a request
    Protocol,
    /// A core invariant was broken; the affected subsystem must stop
    InternalConsistency,
    /// Channels, configuration and transport plumbing
    Infrastructure,
}

impl ErrorClass {
    /// Internal-consistency violations are the only fatal class
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::InternalConsistency)
    }
}

/// Top-level error for the sequencer core
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Validation error: {context}: {message}")]
    Validation { context: String, message: String },

    #[error("Internal consistency violation in {component}: {message}")]
    InternalConsistency { component: String, message: String },

    #[error("Channel closed: {component}")]
    ChannelClosed { component: String },

    #[error(transparent)]
    Shadow(#[from] ShadowError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl SequencerError {
    /// Create a validation error
    pub fn validation(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an internal-consistency error
    pub fn internal_consistency(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InternalConsistency {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a channel closed error
    pub fn channel_closed(component: impl Into<String>) -> Self {
        Self::ChannelClosed {
            component: component.into(),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Validation,
            Self::InternalConsistency { .. } => ErrorClass::InternalConsistency,
            Self::ChannelClosed { .. } | Self::Configuration(_) => ErrorClass::Infrastructure,
            Self::Shadow(e) => e.class(),
        }
    }

    /// Whether this error must abort the affected subsystem
    pub fn is_fatal(&self) -> bool {
        self.class().is_fatal()
    }
}

pub type Result<T> = std::result::Result<T, SequencerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            SequencerError::validation("timeline", "empty").class(),
            ErrorClass::Validation
        );
        assert!(SequencerError::internal_consistency("scheduler", "bad part").is_fatal());
        assert!(!SequencerError::channel_closed("sequencer").is_fatal());

        let shadow: SequencerError = ShadowError::protocol_failure("get", Some("pod"), "pod-1").into();
        assert_eq!(shadow.class(), ErrorClass::Protocol);
    }

    #[test]
    fn test_display_carries_context() {
        let err = SequencerError::validation("timeline", "part list is empty");
        assert_eq!(
            err.to_string(),
            "Validation error: timeline: part list is empty"
        );
    }
}
