// ABOUTME: Error types for command table construction and per-message invocation.
// ABOUTME: Configuration errors abort startup; invocation errors reject or report a single message.

use thiserror::Error;

use crate::kind::ArgumentKind;

/// A declaration the table builder refused. Every variant names the handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("handler '{handler}' derives an empty command name")]
    EmptyName { handler: String },

    #[error("handler '{handler}': command name or alias '{name}' must be a single non-empty token")]
    InvalidName { handler: String, name: String },

    #[error("handler '{handler}': rest parameter '{parameter}' must be the last parameter")]
    RestNotLast { handler: String, parameter: String },

    #[error("handler '{handler}': rest parameter '{parameter}' cannot have a default")]
    RestWithDefault { handler: String, parameter: String },

    #[error("handler '{handler}': required parameter '{parameter}' follows an optional one")]
    RequiredAfterOptional { handler: String, parameter: String },

    #[error("handler '{handler}': parameter '{parameter}' has unsupported type '{type_name}'")]
    UnsupportedType {
        handler: String,
        parameter: String,
        type_name: String,
    },

    #[error("handler '{handler}': default for '{parameter}' is {actual}, expected {expected}")]
    DefaultTypeMismatch {
        handler: String,
        parameter: String,
        expected: ArgumentKind,
        actual: ArgumentKind,
    },

    #[error("handler '{handler}': '{name}' is already used by command '{existing}'")]
    DuplicateName {
        handler: String,
        name: String,
        existing: String,
    },
}

impl ConfigurationError {
    /// Identifier of the handler whose declaration was rejected
    pub fn handler(&self) -> &str {
        match self {
            Self::EmptyName { handler }
            | Self::InvalidName { handler, .. }
            | Self::RestNotLast { handler, .. }
            | Self::RestWithDefault { handler, .. }
            | Self::RequiredAfterOptional { handler, .. }
            | Self::UnsupportedType { handler, .. }
            | Self::DefaultTypeMismatch { handler, .. }
            | Self::DuplicateName { handler, .. } => handler,
        }
    }
}

/// Why a matched message did not complete its command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationError {
    #[error("{command}: expected {}, got {given}", expected_range(.min, .max))]
    ArgumentCount {
        command: String,
        given: usize,
        min: usize,
        /// `None` when a rest parameter soaks up extra tokens
        max: Option<usize>,
    },

    #[error("{command}: argument {index} is not a valid {kind}: {token:?} ({reason})")]
    BadArgument {
        command: String,
        index: usize,
        kind: ArgumentKind,
        token: String,
        reason: String,
    },

    #[error("{command} failed: {message}")]
    HandlerFailed { command: String, message: String },

    #[error("{command} panicked: {message}")]
    HandlerPanicked { command: String, message: String },
}

impl InvocationError {
    pub fn command(&self) -> &str {
        match self {
            Self::ArgumentCount { command, .. }
            | Self::BadArgument { command, .. }
            | Self::HandlerFailed { command, .. }
            | Self::HandlerPanicked { command, .. } => command,
        }
    }

    /// True when the message was rejected before the handler ran
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ArgumentCount { .. } | Self::BadArgument { .. })
    }
}

fn expected_range(min: &usize, max: &Option<usize>) -> String {
    match *max {
        None => format!("at least {} argument(s)", min),
        Some(max) if max == *min => format!("{} argument(s)", min),
        Some(max) => format!("{} to {} arguments", min, max),
    }
}
