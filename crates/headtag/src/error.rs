//! Error types for the headtag crate.

use thiserror::Error;

use crate::hooks::HookError;

/// Errors surfaced by [`Head`](crate::Head) operations.
///
/// Field-level failures never show up here: a rejected [`Deferred`](crate::Deferred)
/// value only drops the tag it belongs to.
#[derive(Debug, Error)]
pub enum HeadError {
    /// A context-free registration found no active head.
    #[error("no active head: call set_active_head() before registering entries")]
    MissingContext,

    /// A hook listener failed and aborted the pipeline.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The persisted payload could not be serialized or parsed.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// An entry's input did not have the expected shape.
    #[error("invalid input for '{field}': {message}")]
    Input {
        /// The offending field (or `<root>`).
        field: String,
        /// What was wrong with it.
        message: String,
    },
}

impl HeadError {
    pub(crate) fn input(field: impl Into<String>, message: impl Into<String>) -> Self {
        HeadError::Input {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_yaml::Error> for HeadError {
    fn from(err: serde_yaml::Error) -> Self {
        HeadError::Config(err.to_string())
    }
}

impl From<std::io::Error> for HeadError {
    fn from(err: std::io::Error) -> Self {
        HeadError::Config(err.to_string())
    }
}

/// Result type for head operations.
pub type Result<T> = std::result::Result<T, HeadError>;

/// Rejection of a deferred field value.
///
/// Cloneable so a shared deferred value can hand the same outcome to every
/// resolution that awaits it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deferred value rejected: {0}")]
pub struct FieldError(pub String);

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        FieldError(message.into())
    }
}
