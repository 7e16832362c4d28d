//! # Dispatch
//!
//! The consume loop and the single-shot consumer close wrapper it runs on.

pub mod consumer_guard;
pub mod dispatcher;

pub use consumer_guard::ConsumerGuard;
pub use dispatcher::{DispatchState, DispatchStats, Dispatcher, RecordOutcome, ShutdownReport};
