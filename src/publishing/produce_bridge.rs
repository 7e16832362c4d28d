//! Produce-acknowledge bridge.
//!
//! Encodes a message, hands it to the producer capability and waits for the
//! broker acknowledgment, bounded by the configured timeout. The caller always
//! gets a [`SendResult`]; failures are reported through it, never as an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::codec;
use crate::config::ProducerConfig;
use crate::error::DispatchError;
use crate::messaging::{ProducerCapability, SendFailure, SendResult};

/// Bridges fire-and-forget producers to an awaited acknowledgment
pub struct ProduceBridge<P: ProducerCapability> {
    producer: Arc<P>,
    ack_timeout: Duration,
    flush_on_failure: bool,
}

impl<P: ProducerCapability> Clone for ProduceBridge<P> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            ack_timeout: self.ack_timeout,
            flush_on_failure: self.flush_on_failure,
        }
    }
}

impl<P: ProducerCapability> std::fmt::Debug for ProduceBridge<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProduceBridge")
            .field("provider", &self.producer.provider_name())
            .field("ack_timeout", &self.ack_timeout)
            .field("flush_on_failure", &self.flush_on_failure)
            .finish()
    }
}

impl<P: ProducerCapability> ProduceBridge<P> {
    pub fn new(producer: Arc<P>, config: &ProducerConfig) -> Self {
        Self {
            producer,
            ack_timeout: config.ack_timeout(),
            flush_on_failure: config.flush_on_failure,
        }
    }

    /// Override the acknowledgment wait
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn producer(&self) -> &Arc<P> {
        &self.producer
    }

    /// Publish and wait for the acknowledgment
    ///
    /// Resolves within roughly twice the ack timeout (send wait plus the
    /// bounded cleanup flush) even if the producer never answers.
    pub async fn send_and_await<T: Serialize + ?Sized>(&self, topic: &str, message: &T) -> SendResult {
        let value = serde_json::to_value(message).unwrap_or(Value::Null);

        let payload = match codec::encode(message) {
            Ok(payload) => payload,
            Err(e) => return self.fail(topic, value, SendFailure::Encode, e).await,
        };

        match timeout(self.ack_timeout, self.producer.send(topic, payload)).await {
            Ok(Ok(metadata)) => {
                debug!(
                    topic = %metadata.topic,
                    partition = metadata.partition,
                    offset = metadata.offset,
                    "✅ Publish acknowledged"
                );
                SendResult::success(metadata, value)
            }
            Ok(Err(e)) => self.fail(topic, value, SendFailure::Rejected, e).await,
            Err(_) => {
                let err = DispatchError::send_timeout(topic, self.ack_timeout.as_millis() as u64);
                self.fail(topic, value, SendFailure::Timeout, err).await
            }
        }
    }

    /// Publish, then hand the result to `continuation` exactly once
    pub async fn publish<T, F, R>(&self, topic: &str, message: &T, continuation: F) -> R
    where
        T: Serialize + ?Sized,
        F: FnOnce(SendResult) -> R,
    {
        let result = self.send_and_await(topic, message).await;
        continuation(result)
    }

    /// Bind a topic and a continuation into a reusable publishing function
    pub fn produced<F>(&self, topic: impl Into<String>, continuation: F) -> ProducedTopic<P, F> {
        ProducedTopic {
            topic: topic.into(),
            bridge: self.clone(),
            continuation,
        }
    }

    async fn fail(
        &self,
        topic: &str,
        message: Value,
        reason: SendFailure,
        err: DispatchError,
    ) -> SendResult {
        error!(
            severity = "critical",
            topic = %topic,
            reason = ?reason,
            provider = self.producer.provider_name(),
            error = %err,
            "💥 Publish failed"
        );

        if self.flush_on_failure {
            match timeout(self.ack_timeout, self.producer.flush()).await {
                Ok(Ok(())) => debug!(topic = %topic, "Producer flushed after failed publish"),
                Ok(Err(e)) => warn!(topic = %topic, error = %e, "Producer flush failed"),
                Err(_) => warn!(topic = %topic, "Producer flush timed out"),
            }
        }

        SendResult::failure(topic, message, reason, err.to_string())
    }
}

/// A topic bound to a continuation; each `call` publishes one message
pub struct ProducedTopic<P: ProducerCapability, F> {
    topic: String,
    bridge: ProduceBridge<P>,
    continuation: F,
}

impl<P: ProducerCapability, F> ProducedTopic<P, F> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `message` and return what the continuation made of the result
    pub async fn call<T, R>(&self, message: &T) -> R
    where
        T: Serialize + ?Sized,
        F: Fn(SendResult) -> R,
    {
        let result = self.bridge.send_and_await(&self.topic, message).await;
        (self.continuation)(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{ConsumerCapability, InMemoryBroker, InMemoryProducer, SendStatus};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn bridge(broker: &Arc<InMemoryBroker>, ack_timeout_ms: u64) -> ProduceBridge<InMemoryProducer> {
        let config = ProducerConfig {
            ack_timeout_ms,
            ..ProducerConfig::default()
        };
        ProduceBridge::new(Arc::new(broker.producer()), &config)
    }

    #[tokio::test]
    async fn test_acknowledged_send_carries_offsets() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = bridge(&broker, 1_000);

        let first = bridge.send_and_await("orders", &json!({"id": 1})).await;
        let second = bridge.send_and_await("orders", &json!({"id": 2})).await;

        assert!(first.is_success());
        assert_eq!(first.partition, Some(0));
        assert_eq!(first.offset, Some(0));
        assert_eq!(second.offset, Some(1));
        assert_eq!(second.message, json!({"id": 2}));
        assert!(second.acknowledged_at.is_some());
        assert_eq!(broker.flush_count(), 0);
    }

    #[tokio::test]
    async fn test_sent_payload_decodes_to_message() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = bridge(&broker, 1_000);

        bridge.send_and_await("nums", &42).await;

        let mut consumer = broker.consumer();
        consumer.subscribe(&["nums".to_string()]).await.unwrap();
        let records = consumer.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(codec::decode::<i64>(&records[0].payload).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_yields_failure_and_flushes() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_ack_delay(Some(Duration::from_millis(500)));
        let bridge = bridge(&broker, 30);

        let result = bridge.send_and_await("orders", &json!({"id": 7})).await;

        assert_eq!(result.status, SendStatus::Failure(SendFailure::Timeout));
        assert_eq!(result.status_code(), 504);
        assert_eq!(result.partition, None);
        assert_eq!(result.offset, None);
        assert!(result.error.as_deref().unwrap_or_default().contains("orders"));
        assert_eq!(broker.flush_count(), 1);
        assert_eq!(broker.topic_len("orders"), 0);
    }

    #[tokio::test]
    async fn test_rejection_yields_failure() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_reject_sends(true);
        let bridge = bridge(&broker, 1_000);

        let result = bridge.send_and_await("orders", &json!("x")).await;
        assert_eq!(result.status, SendStatus::Failure(SendFailure::Rejected));
        assert_eq!(result.status_code(), 502);
    }

    #[tokio::test]
    async fn test_unencodable_message_yields_encode_failure() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = bridge(&broker, 1_000);

        // JSON object keys must be strings
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], "value");
        let result = bridge.send_and_await("orders", &bad).await;

        assert_eq!(result.status, SendStatus::Failure(SendFailure::Encode));
        assert_eq!(result.status_code(), 400);
        assert_eq!(broker.topic_len("orders"), 0);
    }

    #[tokio::test]
    async fn test_no_flush_when_disabled() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_reject_sends(true);
        let config = ProducerConfig {
            flush_on_failure: false,
            ..ProducerConfig::default()
        };
        let bridge = ProduceBridge::new(Arc::new(broker.producer()), &config);

        let result = bridge.send_and_await("orders", &1).await;
        assert!(!result.is_success());
        assert_eq!(broker.flush_count(), 0);
    }

    #[tokio::test]
    async fn test_produced_topic_applies_continuation() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = bridge(&broker, 1_000);
        let produced = bridge.produced("orders", |result: SendResult| result.offset);

        assert_eq!(produced.topic(), "orders");
        assert_eq!(produced.call(&json!({"id": 1})).await, Some(0));
        assert_eq!(produced.call(&json!({"id": 2})).await, Some(1));
    }
}
