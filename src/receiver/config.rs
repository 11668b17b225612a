use std::time::Duration;

use serde::Deserialize;

use crate::errors::SqsRuntimeError;

/// Upper bound SQS places on a single receive call.
pub const MAX_BATCH_SIZE: i32 = 10;

/// Longest long-poll wait SQS accepts, in seconds.
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// Longest visibility timeout SQS accepts (12 hours), in seconds.
pub const MAX_VISIBILITY_TIMEOUT: i32 = 43_200;

/// Parameters of the receive call one poll loop repeats.
///
/// Built once per queue subscription and reused for every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// URL of the queue to poll.
    pub queue_url: String,

    /// The maximum number of messages to receive in a single request.
    pub max_number_of_messages: i32,

    /// Seconds a received message stays hidden from other consumers.
    pub visibility_timeout: i32,

    /// The wait time for long polling, in seconds.
    pub wait_time_seconds: i32,

    /// Optional bound on how long one handler invocation may take.
    ///
    /// `None` lets a handler run for as long as it needs, which also means a
    /// hung handler stalls its whole poll loop.
    pub handler_timeout: Option<Duration>,
}

impl ReceiveRequest {
    pub fn new(queue_url: impl Into<String>) -> Self {
        QueueConfig::default().into_request(queue_url)
    }

    pub fn with_max_number_of_messages(mut self, max_number_of_messages: i32) -> Self {
        self.max_number_of_messages = max_number_of_messages;
        self
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: i32) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn with_wait_time_seconds(mut self, wait_time_seconds: i32) -> Self {
        self.wait_time_seconds = wait_time_seconds;
        self
    }

    pub fn with_handler_timeout(mut self, handler_timeout: Duration) -> Self {
        self.handler_timeout = Some(handler_timeout);
        self
    }

    /// Checks the request against the limits SQS enforces.
    pub fn validate(&self) -> Result<(), SqsRuntimeError> {
        if self.queue_url.trim().is_empty() {
            return Err(SqsRuntimeError::InvalidConfiguration(
                "queue url must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.max_number_of_messages) {
            return Err(SqsRuntimeError::InvalidConfiguration(format!(
                "max_number_of_messages must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.max_number_of_messages
            )));
        }
        if !(0..=MAX_VISIBILITY_TIMEOUT).contains(&self.visibility_timeout) {
            return Err(SqsRuntimeError::InvalidConfiguration(format!(
                "visibility_timeout must be between 0 and {MAX_VISIBILITY_TIMEOUT}, got {}",
                self.visibility_timeout
            )));
        }
        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&self.wait_time_seconds) {
            return Err(SqsRuntimeError::InvalidConfiguration(format!(
                "wait_time_seconds must be between 0 and {MAX_WAIT_TIME_SECONDS}, got {}",
                self.wait_time_seconds
            )));
        }
        if self.handler_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(SqsRuntimeError::InvalidConfiguration(
                "handler_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings applied when a queue is consumed by name.
///
/// Loadable from the environment with [`QueueConfig::from_env`], e.g.
/// `SQS_RUNTIME__MAX_MESSAGES=5`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Batch size cap for each receive call.
    pub max_messages: i32,

    /// Seconds the queue hides a received message from other consumers.
    pub visibility_timeout: i32,

    /// Long-poll duration, in seconds.
    pub wait_time_seconds: i32,

    /// Per-handler timeout in seconds; unset means no timeout.
    pub handler_timeout_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_messages: 10,
            visibility_timeout: 10,
            wait_time_seconds: 20,
            handler_timeout_secs: None,
        }
    }
}

impl QueueConfig {
    /// Environment variable prefix read by [`QueueConfig::from_env`].
    pub const ENV_PREFIX: &'static str = "SQS_RUNTIME";

    /// Loads settings from `SQS_RUNTIME__*` environment variables, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self, SqsRuntimeError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Builds the receive request for a resolved queue URL.
    pub fn into_request(&self, queue_url: impl Into<String>) -> ReceiveRequest {
        ReceiveRequest {
            queue_url: queue_url.into(),
            max_number_of_messages: self.max_messages,
            visibility_timeout: self.visibility_timeout,
            wait_time_seconds: self.wait_time_seconds,
            handler_timeout: self.handler_timeout_secs.map(Duration::from_secs),
        }
    }
}
