//! # Messaging Module
//!
//! Broker-facing seam of the dispatch core: the consumer and producer
//! capability traits, the record and result types that cross them, and
//! the in-memory provider used for tests and local runs.

pub mod providers;
mod traits;
mod types;

pub use providers::{InMemoryBroker, InMemoryConsumer, InMemoryProducer};
pub use traits::{ConsumerCapability, ProducerCapability};
pub use types::{
    InboundRecord, RecordContext, RecordMetadata, SendFailure, SendResult, SendStatus,
};
