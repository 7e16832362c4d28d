//! Single-shot close wrapper around a consumer capability.
//!
//! The guard forwards every call to the wrapped consumer until it has been
//! closed once; afterwards calls are rejected and further closes are no-ops.

use std::time::Duration;

use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::messaging::{ConsumerCapability, InboundRecord};

#[derive(Debug)]
pub struct ConsumerGuard<C> {
    consumer: C,
    closed: bool,
}

impl<C: ConsumerCapability> ConsumerGuard<C> {
    pub fn new(consumer: C) -> Self {
        Self {
            consumer,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn provider_name(&self) -> &'static str {
        self.consumer.provider_name()
    }

    pub async fn subscribe(&mut self, topics: &[String]) -> DispatchResult<()> {
        if self.closed {
            return Err(DispatchError::subscribe(topics, "consumer already closed"));
        }
        self.consumer.subscribe(topics).await
    }

    pub async fn poll(&mut self, timeout: Duration) -> DispatchResult<Vec<InboundRecord>> {
        if self.closed {
            return Err(DispatchError::poll("consumer already closed"));
        }
        self.consumer.poll(timeout).await
    }

    pub async fn commit(&mut self, record: &InboundRecord) -> DispatchResult<()> {
        if self.closed {
            return Err(DispatchError::commit(
                &record.topic,
                record.partition,
                record.offset,
                "consumer already closed",
            ));
        }
        self.consumer.commit(record).await
    }

    /// Close the consumer the first time only
    ///
    /// Returns `Ok(true)` when this call performed the close. A failed close
    /// still counts as the single attempt.
    pub async fn close_once(&mut self) -> DispatchResult<bool> {
        if self.closed {
            debug!(provider = self.provider_name(), "Consumer already closed");
            return Ok(false);
        }
        self.closed = true;
        self.consumer.close().await.map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryBroker;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_close_happens_once() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut guard = ConsumerGuard::new(broker.consumer());

        assert!(guard.close_once().await.unwrap());
        assert!(!guard.close_once().await.unwrap());
        assert!(!guard.close_once().await.unwrap());

        assert!(guard.is_closed());
        assert_eq!(broker.consumer_close_count(), 1);
    }

    #[tokio::test]
    async fn test_calls_after_close_are_rejected() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut guard = ConsumerGuard::new(broker.consumer());
        guard.close_once().await.unwrap();

        assert!(guard.subscribe(&["nums".to_string()]).await.is_err());
        assert!(guard.poll(Duration::from_millis(1)).await.is_err());
        let record = InboundRecord::new("nums", 0, 0, Vec::new());
        assert!(matches!(
            guard.commit(&record).await,
            Err(DispatchError::Commit { .. })
        ));
    }
}
