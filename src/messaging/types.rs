//! # Messaging Types
//!
//! Records flowing in from the consumer capability and results flowing back
//! to publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record delivered by the consumer capability
///
/// Owned by the dispatch loop for one dispatch cycle, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Encoded payload, see [`crate::codec`]
    pub payload: Vec<u8>,
}

impl InboundRecord {
    /// Create a new inbound record
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            payload,
        }
    }

    /// Position metadata handed to handlers
    pub fn context(&self) -> RecordContext {
        RecordContext {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Where a record came from; passed to trait handlers next to the decoded value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordContext {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl std::fmt::Display for RecordContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// Broker acknowledgment of a single send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Why a publish did not get acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendFailure {
    /// No acknowledgment within the configured wait
    Timeout,
    /// The producer capability reported an error
    Rejected,
    /// The message could not be encoded
    Encode,
}

/// Outcome carried by a [`SendResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SendStatus {
    Success,
    Failure(SendFailure),
}

impl SendStatus {
    /// HTTP-flavoured status code for callers that forward results over HTTP
    pub fn status_code(&self) -> u16 {
        match self {
            SendStatus::Success => 200,
            SendStatus::Failure(SendFailure::Timeout) => 504,
            SendStatus::Failure(SendFailure::Rejected) => 502,
            SendStatus::Failure(SendFailure::Encode) => 400,
        }
    }
}

/// Result of a publish, passed exactly once to the caller's continuation
///
/// Partition and offset are only present when the broker acknowledged the
/// write; a failure never masquerades as an acknowledgment without metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    /// The original message as sent
    pub message: Value,
    pub status: SendStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SendResult {
    /// Acknowledged send
    pub fn success(metadata: RecordMetadata, message: Value) -> Self {
        Self {
            topic: metadata.topic,
            partition: Some(metadata.partition),
            offset: Some(metadata.offset),
            message,
            status: SendStatus::Success,
            acknowledged_at: Some(Utc::now()),
            error: None,
        }
    }

    /// Failed or unacknowledged send
    pub fn failure(
        topic: impl Into<String>,
        message: Value,
        reason: SendFailure,
        error: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            offset: None,
            message,
            status: SendStatus::Failure(reason),
            acknowledged_at: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, SendStatus::Success)
    }

    pub fn status_code(&self) -> u16 {
        self.status.status_code()
    }

    /// Render as a JSON document
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
