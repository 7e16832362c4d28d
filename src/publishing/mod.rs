//! # Publishing
//!
//! Request/acknowledge publishing on top of a [`ProducerCapability`]. Every
//! publish resolves to exactly one [`SendResult`](crate::messaging::SendResult),
//! successful or not.
//!
//! [`ProducerCapability`]: crate::messaging::ProducerCapability

pub mod produce_bridge;

pub use produce_bridge::{ProduceBridge, ProducedTopic};
