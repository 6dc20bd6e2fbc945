//! Notification System Error Types

use std::any::Any;
use serde::Serialize;
use thiserror::Error;

/// Result type returned by handlers
pub type HandlerResult = Result<(), HandlerFailure>;

/// Result type for hub operations that can fail
pub type NotificationResult<T> = Result<T, NotificationError>;

/// A failure raised by a single handler during dispatch
///
/// Captured into the dispatch report; never propagated out of `publish`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerFailure {
    /// Handler returned an error
    #[error("handler failed: {message}")]
    Failed { message: String },

    /// Handler panicked
    #[error("handler panicked: {message}")]
    Panicked { message: String },
}

impl HandlerFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { message: message.into() }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked { message: message.into() }
    }

    /// Convert a payload caught by `catch_unwind`
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message } | Self::Panicked { message } => message,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

impl From<&str> for HandlerFailure {
    fn from(message: &str) -> Self {
        Self::failed(message)
    }
}

impl From<String> for HandlerFailure {
    fn from(message: String) -> Self {
        Self::failed(message)
    }
}

impl From<anyhow::Error> for HandlerFailure {
    fn from(error: anyhow::Error) -> Self {
        Self::failed(format!("{:#}", error))
    }
}

impl From<std::io::Error> for HandlerFailure {
    fn from(error: std::io::Error) -> Self {
        Self::failed(error.to_string())
    }
}

/// Errors raised by hub-level operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// An event kind was empty or whitespace only
    #[error("event kind must not be empty")]
    EmptyEventKind,
}
