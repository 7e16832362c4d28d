//! # Dispatch Service
//!
//! Application-facing entry point. Collects topic handlers through
//! `on_consume*`, hands out publishing functions through `on_produce`, and
//! runs the dispatch loop until the process is asked to stop.
//!
//! ```rust,no_run
//! use dispatch_core::config::DispatchConfig;
//! use dispatch_core::messaging::{InMemoryBroker, SendResult};
//! use dispatch_core::service::DispatchService;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Arc::new(InMemoryBroker::new());
//! let mut service = DispatchService::new(
//!     broker.consumer(),
//!     Arc::new(broker.producer()),
//!     DispatchConfig::default(),
//! );
//!
//! let doubled = service.on_produce("doubled", |result: SendResult| result.is_success());
//! service.on_consume_typed("nums", |n: i64| {
//!     println!("{}", n * 2);
//!     Ok(())
//! });
//!
//! doubled.call(&4).await;
//! let report = service.run().await?;
//! std::process::exit(report.exit_code());
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::dispatch::{Dispatcher, ShutdownReport};
use crate::error::{DispatchError, DispatchResult};
use crate::lifecycle::LifecycleController;
use crate::messaging::{ConsumerCapability, ProducerCapability};
use crate::publishing::{ProduceBridge, ProducedTopic};
use crate::registry::{HandlerRegistry, HandlerResult, MessageHandler};

pub struct DispatchService<C: ConsumerCapability, P: ProducerCapability> {
    consumer: C,
    registry: HandlerRegistry,
    bridge: ProduceBridge<P>,
    lifecycle: LifecycleController,
    config: DispatchConfig,
}

impl<C: ConsumerCapability, P: ProducerCapability> DispatchService<C, P> {
    pub fn new(consumer: C, producer: Arc<P>, config: DispatchConfig) -> Self {
        Self {
            consumer,
            registry: HandlerRegistry::new(),
            bridge: ProduceBridge::new(producer, &config.producer),
            lifecycle: LifecycleController::new(),
            config,
        }
    }

    /// Share an existing lifecycle controller instead of the service's own
    pub fn with_lifecycle(mut self, lifecycle: LifecycleController) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Add a function to the topic's handler chain
    pub fn on_consume<F>(&mut self, topic: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register_fn(topic, func);
        self
    }

    /// Add a function over a typed message to the topic's handler chain
    pub fn on_consume_typed<T, F>(&mut self, topic: impl Into<String>, func: F) -> &mut Self
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register_typed(topic, func);
        self
    }

    /// Add an async function to the topic's handler chain
    pub fn on_consume_async<F, Fut>(&mut self, topic: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_async(topic, func);
        self
    }

    /// Add a [`MessageHandler`] implementation to the topic's handler chain
    pub fn on_consume_handler(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        self.registry.register(topic, handler);
        self
    }

    /// Publishing function for `topic` whose results go through `continuation`
    pub fn on_produce<F>(&self, topic: impl Into<String>, continuation: F) -> ProducedTopic<P, F> {
        self.bridge.produced(topic, continuation)
    }

    pub fn bridge(&self) -> &ProduceBridge<P> {
        &self.bridge
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Consume until shutdown, then close the consumer
    ///
    /// Installs the termination signal handlers first unless disabled in
    /// configuration.
    pub async fn run(self) -> DispatchResult<ShutdownReport> {
        let DispatchService {
            mut consumer,
            registry,
            lifecycle,
            config,
            ..
        } = self;

        let _signals = if config.lifecycle.install_signal_handlers {
            match lifecycle.install_signal_handlers() {
                Ok(listener) => Some(listener),
                Err(e) => {
                    if let Err(close_err) = consumer.close().await {
                        warn!(error = %close_err, "Consumer close reported an error");
                    }
                    lifecycle.mark_stopped();
                    return Err(DispatchError::configuration(
                        "lifecycle",
                        format!("failed to install signal handlers: {e}"),
                    ));
                }
            }
        } else {
            None
        };

        let stats = registry.stats();
        info!(
            topics = stats.total_topics,
            handlers = stats.total_handlers,
            "🚀 Starting dispatch service"
        );

        Dispatcher::new(consumer, registry, lifecycle, &config.consumer)
            .run()
            .await
    }
}
