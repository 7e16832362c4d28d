//! # Dispatch Error Types
//!
//! Structured error handling for the dispatch core using thiserror
//! instead of `Box<dyn Error>` patterns.
//!
//! Errors fall into two groups:
//! - **Per-record** (`Decode`, `Handler`): logged and swallowed by the dispatch loop
//! - **Fatal** (`Configuration`, `Subscribe`, `Commit`): end the loop and the process

use thiserror::Error;

/// Boxed error returned by application handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Exit status for a graceful shutdown
pub const EXIT_GRACEFUL: i32 = 0;
/// Exit status for unrecoverable runtime failures
pub const EXIT_FAILURE: i32 = 1;
/// Exit status for configuration errors (sysexits `EX_CONFIG`)
pub const EXIT_CONFIG: i32 = 78;

/// Comprehensive dispatch error types
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Payload decode error: {message}")]
    Decode { message: String },

    #[error("Payload encode error: {message}")]
    Encode { message: String },

    #[error("Handler '{handler}' failed for topic {topic}: {message}")]
    Handler {
        topic: String,
        handler: String,
        message: String,
    },

    #[error("Commit failed for {topic}[{partition}]@{offset}: {message}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },

    #[error("Send to topic {topic} not acknowledged within {timeout_ms}ms")]
    SendTimeout { topic: String, timeout_ms: u64 },

    #[error("Send to topic {topic} failed: {message}")]
    Send { topic: String, message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Subscribe failed for topics {topics:?}: {message}")]
    Subscribe { topics: Vec<String>, message: String },

    #[error("Poll failed: {message}")]
    Poll { message: String },

    #[error("Consumer close failed: {message}")]
    Close { message: String },

    #[error("Internal dispatch error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Create a payload decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a payload encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a handler failure error
    pub fn handler(
        topic: impl Into<String>,
        handler: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Handler {
            topic: topic.into(),
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Create a commit error
    pub fn commit(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        message: impl Into<String>,
    ) -> Self {
        Self::Commit {
            topic: topic.into(),
            partition,
            offset,
            message: message.into(),
        }
    }

    /// Create a send timeout error
    pub fn send_timeout(topic: impl Into<String>, timeout_ms: u64) -> Self {
        Self::SendTimeout {
            topic: topic.into(),
            timeout_ms,
        }
    }

    /// Create a send error
    pub fn send(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Send {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a subscribe error
    pub fn subscribe(topics: &[String], message: impl Into<String>) -> Self {
        Self::Subscribe {
            topics: topics.to_vec(),
            message: message.into(),
        }
    }

    /// Create a poll error
    pub fn poll(message: impl Into<String>) -> Self {
        Self::Poll {
            message: message.into(),
        }
    }

    /// Create a close error
    pub fn close(message: impl Into<String>) -> Self {
        Self::Close {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error must stop the dispatch loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Subscribe { .. } | Self::Commit { .. }
        )
    }

    /// Process exit status for this error when it terminates the worker
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}

/// Conversion from serde_json::Error to DispatchError
///
/// Only used on the decode path; encode failures are mapped explicitly.
impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::decode(err.to_string())
    }
}

/// Conversion from base64::DecodeError to DispatchError
impl From<base64::DecodeError> for DispatchError {
    fn from(err: base64::DecodeError) -> Self {
        DispatchError::decode(format!("invalid base64 payload: {err}"))
    }
}

/// Conversion from configuration errors raised while loading settings
impl From<crate::config::ConfigurationError> for DispatchError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        DispatchError::configuration("config", err.to_string())
    }
}

/// Result type alias for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
