//! # Handler Registry
//!
//! Maps topic names to the ordered list of handlers that process records
//! from that topic.
//!
//! ## Overview
//!
//! Registration happens during application startup. The registry is then
//! moved into the dispatch loop, which only reads it, so no handler can be
//! added once the consumer has subscribed.
//!
//! ## Ordering
//!
//! Handlers for a topic run in registration order. Registering the same
//! handler twice is allowed and it runs twice.
//!
//! ## Usage
//!
//! ```rust
//! use dispatch_core::registry::HandlerRegistry;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("nums", |value| {
//!     println!("got {value}");
//!     Ok(())
//! });
//! registry.register_typed("nums", |n: i64| {
//!     println!("doubled {}", n * 2);
//!     Ok(())
//! });
//!
//! assert_eq!(registry.topics(), vec!["nums".to_string()]);
//! assert_eq!(registry.handlers_for("nums").len(), 2);
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::BoxError;
use crate::messaging::RecordContext;

/// Result returned by every handler
pub type HandlerResult = Result<(), BoxError>;

/// Trait for topic message handlers
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one decoded message
    async fn handle(&self, context: &RecordContext, message: &Value) -> HandlerResult;

    /// Handler name for identification in logs
    fn handler_name(&self) -> &str {
        "unnamed_handler"
    }
}

/// Handler built from a synchronous closure over the decoded value
pub struct FnHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Value) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, _context: &RecordContext, message: &Value) -> HandlerResult {
        (self.func)(message)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Handler built from a closure returning a future
pub struct AsyncFnHandler<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for AsyncFnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, _context: &RecordContext, message: &Value) -> HandlerResult {
        (self.func)(message.clone()).await
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Handler that deserializes the decoded value into `T` before calling the closure
///
/// A value that does not fit `T` is a handler failure for that record.
pub struct TypedHandler<T, F> {
    name: String,
    func: F,
    _message: PhantomData<fn(T)>,
}

#[async_trait]
impl<T, F> MessageHandler for TypedHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, context: &RecordContext, message: &Value) -> HandlerResult {
        let typed: T = serde_json::from_value(message.clone()).map_err(|e| {
            format!(
                "message at {context} does not match {}: {e}",
                std::any::type_name::<T>()
            )
        })?;
        (self.func)(typed)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// A handler together with the name it was registered under
#[derive(Clone)]
pub struct RegisteredHandler {
    pub name: String,
    pub handler: Arc<dyn MessageHandler>,
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("handler", &"<Arc<dyn MessageHandler>>".to_string())
            .finish()
    }
}

/// Registry of topic handlers
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the topic's chain, creating the chain if absent
    pub fn register(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        let topic = topic.into();
        let name = handler.handler_name().to_string();
        let chain = self.handlers.entry(topic.clone()).or_default();
        chain.push(RegisteredHandler { name, handler });

        debug!(
            topic = %topic,
            position = chain.len() - 1,
            "Registered handler"
        );
        self
    }

    /// Register a synchronous closure
    pub fn register_fn<F>(&mut self, topic: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let topic = topic.into();
        let name = self.next_name(&topic);
        self.register(topic, Arc::new(FnHandler { name, func }))
    }

    /// Register a closure returning a future
    pub fn register_async<F, Fut>(&mut self, topic: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let topic = topic.into();
        let name = self.next_name(&topic);
        self.register(topic, Arc::new(AsyncFnHandler { name, func }))
    }

    /// Register a closure over a typed message
    pub fn register_typed<T, F>(&mut self, topic: impl Into<String>, func: F) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        let topic = topic.into();
        let name = self.next_name(&topic);
        self.register(
            topic,
            Arc::new(TypedHandler {
                name,
                func,
                _message: PhantomData,
            }),
        )
    }

    /// All registered topic names, sorted
    pub fn topics(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Handlers for a topic in invocation order; empty when the topic is unknown
    pub fn handlers_for(&self, topic: &str) -> &[RegisteredHandler] {
        self.handlers
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registry statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_topics: self.handlers.len(),
            total_handlers: self.handlers.values().map(Vec::len).sum(),
        }
    }

    fn next_name(&self, topic: &str) -> String {
        format!("{topic}#{}", self.handlers_for(topic).len())
    }
}

/// Statistics about registered handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_topics: usize,
    pub total_handlers: usize,
}
