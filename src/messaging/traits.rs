//! # Broker Capability Traits
//!
//! The dispatch core does not talk to a broker directly. It drives a
//! consumer capability and a producer capability; connection management,
//! authentication, partition assignment and wire-level retries all live
//! behind these traits.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{InboundRecord, RecordMetadata};
use crate::error::DispatchResult;

/// Consuming side of a broker client
///
/// Owned exclusively by the dispatch loop, so methods take `&mut self`.
#[async_trait]
pub trait ConsumerCapability: Send + 'static {
    /// Subscribe to the given topics, replacing any previous subscription
    async fn subscribe(&mut self, topics: &[String]) -> DispatchResult<()>;

    /// Wait up to `timeout` for records
    ///
    /// Returns an empty batch when nothing arrived in time. Batch size is
    /// the implementation's choice.
    async fn poll(&mut self, timeout: Duration) -> DispatchResult<Vec<InboundRecord>>;

    /// Acknowledge a fully processed record
    ///
    /// The resumable watermark of the record's topic/partition must not move
    /// past an offset that was never acknowledged, so a record whose handlers
    /// failed is delivered again after a restart.
    async fn commit(&mut self, record: &InboundRecord) -> DispatchResult<()>;

    /// Release broker resources (e.g. leave the consumer group)
    async fn close(&mut self) -> DispatchResult<()>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Producing side of a broker client
#[async_trait]
pub trait ProducerCapability: Send + Sync + 'static {
    /// Send a payload and resolve once the broker acknowledges the write
    ///
    /// Implementations may never resolve; callers bound the wait themselves.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> DispatchResult<RecordMetadata>;

    /// Attempt to drain buffered sends
    async fn flush(&self) -> DispatchResult<()>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
