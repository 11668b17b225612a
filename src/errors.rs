use std::str::FromStr;

use thiserror::Error;

/// Boxed error returned by user handlers.
///
/// Any error type implementing `std::error::Error + Send + Sync` converts into
/// it, so handlers can use `?` freely.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for the SQS polling runtime.
///
/// Only configuration, queue resolution and shutdown errors are returned from
/// the calls that start consuming a queue. Everything that happens inside a
/// running poll loop is logged and contained.
#[derive(Debug, Error)]
pub enum SqsRuntimeError {
    /// A receive request or queue configuration is outside the bounds SQS accepts.
    #[error("invalid receive configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration could not be loaded from the environment.
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] config::ConfigError),

    /// The queue name did not resolve to a queue URL.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// A call to the queue service failed.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The runtime has already begun shutting down and accepts no new queues.
    #[error("runtime is shutting down")]
    ShuttingDown,

    #[error("{0}")]
    GenericError(#[from] GenericError),
}

impl SqsRuntimeError {
    pub(crate) fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        SqsRuntimeError::Transport {
            operation,
            message: message.into(),
        }
    }
}

/// Failure to turn a message body into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has no body")]
    NoBody,

    #[error("malformed message payload: {0}")]
    MalformedPayload(#[source] HandlerError),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::MalformedPayload(Box::new(err))
    }
}

/// Generic error type for handlers and runtime failures that carry only a message.
#[derive(Debug, Error)]
pub struct GenericError(String);

impl GenericError {
    /// Creates a new `GenericError` with the provided message.
    pub fn new(message: impl Into<String>) -> Self {
        GenericError(message.into())
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenericError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GenericError::new(s))
    }
}

impl From<String> for GenericError {
    fn from(s: String) -> Self {
        GenericError::new(s)
    }
}

impl From<&str> for GenericError {
    fn from(s: &str) -> Self {
        GenericError::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_names_the_operation() {
        let err = SqsRuntimeError::transport("ReceiveMessage", "connection reset");
        assert_eq!(err.to_string(), "ReceiveMessage failed: connection reset");
    }

    #[test]
    fn malformed_json_becomes_malformed_payload() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: DecodeError = json_err.into();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn generic_error_converts_into_handler_error() {
        let err: HandlerError = GenericError::new("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
