//! # Capability Providers
//!
//! Concrete consumer/producer capabilities shipped with the crate.

pub mod in_memory;

pub use in_memory::{InMemoryBroker, InMemoryConsumer, InMemoryProducer};
