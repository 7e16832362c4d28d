//! # Registry Infrastructure
//!
//! Topic handler registration for the dispatch loop.
//!
//! ```text
//! HandlerRegistry
//! └── topic -> [handler, handler, ...]   (invocation order = registration order)
//! ```

pub mod handler_registry;

pub use handler_registry::{
    AsyncFnHandler, FnHandler, HandlerRegistry, HandlerResult, MessageHandler, RegisteredHandler,
    RegistryStats, TypedHandler,
};
