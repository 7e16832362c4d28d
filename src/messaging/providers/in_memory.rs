//! # In-Memory Broker
//!
//! Process-local broker implementing both capabilities, for tests,
//! development and the demo worker.
//!
//! ## Features
//!
//! - **Partitioned topics**: round-robin partition assignment on send
//! - **Kafka-like positions**: polling advances the consumer position,
//!   committing advances the committed watermark independently
//! - **Contiguous commits**: the watermark only moves over acknowledged
//!   offsets, so an unacknowledged record holds it back and is redelivered
//! - **Fault injection**: acknowledgment delay, send rejection, commit failure
//! - **Inspection**: commit log, close and flush counters

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::codec;
use crate::error::{DispatchError, DispatchResult};
use crate::messaging::traits::{ConsumerCapability, ProducerCapability};
use crate::messaging::types::{InboundRecord, RecordMetadata};

const DEFAULT_MAX_POLL_RECORDS: usize = 500;

#[derive(Debug, Default)]
struct TopicLog {
    partitions: Vec<Vec<Vec<u8>>>,
    next_partition: usize,
}

impl TopicLog {
    fn with_partitions(count: usize) -> Self {
        Self {
            partitions: vec![Vec::new(); count.max(1)],
            next_partition: 0,
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
    committed: HashMap<(String, i32), i64>,
    // Acknowledged offsets above the watermark, waiting for the gap to close
    acknowledged: HashMap<(String, i32), BTreeSet<i64>>,
    commit_log: Vec<RecordMetadata>,
}

/// Shared in-memory broker
///
/// # Example
///
/// ```rust
/// use dispatch_core::messaging::providers::InMemoryBroker;
/// use std::sync::Arc;
///
/// let broker = Arc::new(InMemoryBroker::new());
/// broker.create_topic("nums", 2);
/// let consumer = broker.consumer();
/// let producer = broker.producer();
/// # drop((consumer, producer));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    arrivals: Notify,
    ack_delay: Mutex<Option<Duration>>,
    reject_sends: AtomicBool,
    fail_commits: AtomicBool,
    consumer_closes: AtomicU64,
    flushes: AtomicU64,
}

impl InMemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topic with a fixed partition count (idempotent)
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        let mut state = self.state.lock();
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicLog::with_partitions(partitions));
    }

    /// Consumer bound to this broker
    pub fn consumer(self: &Arc<Self>) -> InMemoryConsumer {
        InMemoryConsumer::new(Arc::clone(self))
    }

    /// Producer bound to this broker
    pub fn producer(self: &Arc<Self>) -> InMemoryProducer {
        InMemoryProducer {
            broker: Arc::clone(self),
        }
    }

    /// Append a raw payload, creating the topic with one partition if needed
    pub fn append(&self, topic: &str, payload: Vec<u8>) -> RecordMetadata {
        let metadata = {
            let mut state = self.state.lock();
            let log = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicLog::with_partitions(1));

            let partition = log.next_partition % log.partitions.len();
            log.next_partition = log.next_partition.wrapping_add(1);
            let records = &mut log.partitions[partition];
            records.push(payload);

            RecordMetadata {
                topic: topic.to_string(),
                partition: partition as i32,
                offset: (records.len() - 1) as i64,
            }
        };
        self.arrivals.notify_waiters();
        metadata
    }

    /// Encode and append a value
    pub fn publish_value<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
    ) -> DispatchResult<RecordMetadata> {
        Ok(self.append(topic, codec::encode(value)?))
    }

    /// Delay every producer acknowledgment by `delay`
    pub fn set_ack_delay(&self, delay: Option<Duration>) {
        *self.ack_delay.lock() = delay;
    }

    /// Make every producer send fail
    pub fn set_reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Make every consumer commit fail
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Committed watermark (next offset to consume) for a partition
    ///
    /// Stays at the lowest offset that was never acknowledged.
    pub fn committed_offset(&self, topic: &str, partition: i32) -> Option<i64> {
        let state = self.state.lock();
        state.committed.get(&(topic.to_string(), partition)).copied()
    }

    /// Every successful commit in order
    pub fn commit_log(&self) -> Vec<RecordMetadata> {
        self.state.lock().commit_log.clone()
    }

    /// Number of records stored for a topic across partitions
    pub fn topic_len(&self, topic: &str) -> usize {
        let state = self.state.lock();
        state
            .topics
            .get(topic)
            .map(|log| log.partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// How many times any consumer called `close`
    pub fn consumer_close_count(&self) -> u64 {
        self.consumer_closes.load(Ordering::SeqCst)
    }

    /// How many times any producer called `flush`
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    fn fetch(
        &self,
        topics: &[String],
        positions: &mut HashMap<(String, i32), i64>,
        max_records: usize,
    ) -> Vec<InboundRecord> {
        let state = self.state.lock();
        let mut batch = Vec::new();

        for topic in topics {
            let Some(log) = state.topics.get(topic) else {
                continue;
            };
            for (partition, records) in log.partitions.iter().enumerate() {
                let key = (topic.clone(), partition as i32);
                let start = *positions
                    .entry(key.clone())
                    .or_insert_with(|| state.committed.get(&key).copied().unwrap_or(0));

                let mut next = start;
                for payload in records.iter().skip(start as usize) {
                    if batch.len() >= max_records {
                        break;
                    }
                    batch.push(InboundRecord::new(
                        topic.clone(),
                        partition as i32,
                        next,
                        payload.clone(),
                    ));
                    next += 1;
                }
                positions.insert(key, next);
            }
        }

        batch
    }
}

/// Consumer capability over an [`InMemoryBroker`]
#[derive(Debug)]
pub struct InMemoryConsumer {
    broker: Arc<InMemoryBroker>,
    subscriptions: Vec<String>,
    positions: HashMap<(String, i32), i64>,
    max_poll_records: usize,
    closed: bool,
}

impl InMemoryConsumer {
    fn new(broker: Arc<InMemoryBroker>) -> Self {
        Self {
            broker,
            subscriptions: Vec::new(),
            positions: HashMap::new(),
            max_poll_records: DEFAULT_MAX_POLL_RECORDS,
            closed: false,
        }
    }

    /// Cap the number of records returned per poll
    pub fn with_max_poll_records(mut self, max_poll_records: usize) -> Self {
        self.max_poll_records = max_poll_records.max(1);
        self
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl ConsumerCapability for InMemoryConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> DispatchResult<()> {
        if self.closed {
            return Err(DispatchError::subscribe(topics, "consumer is closed"));
        }
        self.subscriptions = topics.to_vec();
        self.positions.clear();
        debug!(topics = ?self.subscriptions, "in-memory consumer subscribed");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> DispatchResult<Vec<InboundRecord>> {
        if self.closed {
            return Err(DispatchError::poll("consumer is closed"));
        }

        let broker = Arc::clone(&self.broker);
        let arrived = broker.arrivals.notified();
        tokio::pin!(arrived);
        // Register interest before the first fetch so an append in between still wakes us
        arrived.as_mut().enable();

        let batch = broker.fetch(&self.subscriptions, &mut self.positions, self.max_poll_records);
        if !batch.is_empty() {
            return Ok(batch);
        }

        if tokio::time::timeout(timeout, arrived).await.is_err() {
            return Ok(Vec::new());
        }
        Ok(broker.fetch(&self.subscriptions, &mut self.positions, self.max_poll_records))
    }

    async fn commit(&mut self, record: &InboundRecord) -> DispatchResult<()> {
        if self.broker.fail_commits.load(Ordering::SeqCst) {
            return Err(DispatchError::commit(
                &record.topic,
                record.partition,
                record.offset,
                "group coordinator not available",
            ));
        }

        let mut guard = self.broker.state.lock();
        let state = &mut *guard;
        let key = (record.topic.clone(), record.partition);
        let watermark = state.committed.entry(key.clone()).or_insert(0);
        let acknowledged = state.acknowledged.entry(key).or_default();
        if record.offset >= *watermark {
            acknowledged.insert(record.offset);
        }
        while acknowledged.remove(&*watermark) {
            *watermark += 1;
        }
        state.commit_log.push(RecordMetadata {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        });
        Ok(())
    }

    async fn close(&mut self) -> DispatchResult<()> {
        if self.closed {
            return Err(DispatchError::close("consumer already left the group"));
        }
        self.closed = true;
        self.subscriptions.clear();
        self.broker.consumer_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

/// Producer capability over an [`InMemoryBroker`]
#[derive(Debug, Clone)]
pub struct InMemoryProducer {
    broker: Arc<InMemoryBroker>,
}

#[async_trait]
impl ProducerCapability for InMemoryProducer {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> DispatchResult<RecordMetadata> {
        let delay = *self.broker.ack_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.broker.reject_sends.load(Ordering::SeqCst) {
            return Err(DispatchError::send(topic, "broker rejected the record"));
        }

        Ok(self.broker.append(topic, payload))
    }

    async fn flush(&self) -> DispatchResult<()> {
        self.broker.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
