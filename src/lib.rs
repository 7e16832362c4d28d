#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dispatch Core
//!
//! Topic-based message dispatch between a streaming broker client and
//! application handlers.
//!
//! ## Overview
//!
//! Applications register per-topic handler functions. A single worker task
//! polls the broker, decodes each record and runs every handler registered
//! for its topic, committing the record's offset only after all of them
//! succeeded. Publishing goes through a produce-acknowledge bridge that waits
//! for the broker confirmation (bounded by a timeout) and hands the caller an
//! explicit [`SendResult`], success or failure.
//!
//! ## Module Organization
//!
//! - [`codec`] - base64-wrapped JSON payload encoding
//! - [`registry`] - topic to handler chain registration
//! - [`dispatch`] - the consume, dispatch and commit loop
//! - [`publishing`] - produce-and-await-acknowledgment
//! - [`lifecycle`] - signal handling and graceful shutdown state
//! - [`messaging`] - broker capability traits and the in-memory provider
//! - [`service`] - application-facing facade tying the above together
//! - [`config`], [`logging`], [`error`] - ambient infrastructure
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dispatch_core::config::ConfigManager;
//! use dispatch_core::messaging::InMemoryBroker;
//! use dispatch_core::service::DispatchService;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let broker = Arc::new(InMemoryBroker::new());
//! let mut service = DispatchService::new(
//!     broker.consumer(),
//!     Arc::new(broker.producer()),
//!     manager.config().clone(),
//! );
//!
//! service.on_consume("events", |event| {
//!     println!("received {event}");
//!     Ok(())
//! });
//!
//! // Runs until SIGINT, SIGTERM, SIGQUIT or SIGHUP
//! let report = service.run().await?;
//! println!("committed {} records", report.stats.records_committed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests (in-memory broker)
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod publishing;
pub mod registry;
pub mod service;

pub use config::{ConfigManager, DispatchConfig};
pub use dispatch::{Dispatcher, RecordOutcome, ShutdownReport};
pub use error::{DispatchError, DispatchResult};
pub use lifecycle::{LifecycleController, LifecycleState, ShutdownSignal, ShutdownTrigger};
pub use messaging::{
    ConsumerCapability, InboundRecord, ProducerCapability, RecordContext, RecordMetadata,
    SendFailure, SendResult, SendStatus,
};
pub use publishing::{ProduceBridge, ProducedTopic};
pub use registry::{HandlerRegistry, HandlerResult, MessageHandler};
pub use service::DispatchService;
