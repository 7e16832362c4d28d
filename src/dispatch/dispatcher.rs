//! # Dispatch Loop
//!
//! Drives the consume cycle: subscribe, poll, decode, run every handler for
//! the record's topic, commit, repeat, until the lifecycle asks to stop.
//!
//! ## State machine
//!
//! ```text
//! Initializing ──start()──> Subscribed ──> Polling ⇄ Dispatching
//!                                              │
//!                          shutdown requested  ▼
//!                                        ShuttingDown ──close──> Closed
//! ```
//!
//! ## Commit policy
//!
//! A record is committed only when every handler registered for its topic
//! returned `Ok`. The first failing handler (error or panic) aborts the rest
//! of the chain and the record is left uncommitted. Decode failures are
//! treated the same way. Neither stops the loop.
//!
//! A failed commit is fatal: the loop shuts down and [`Dispatcher::run`]
//! returns the error.
//!
//! ## Shutdown
//!
//! The shutdown flag is checked between records and between polls, never
//! during a handler chain. After a failed poll the loop waits one poll
//! timeout before retrying, or less when shutdown is requested meanwhile. Records left in a batch after shutdown is requested
//! are not dispatched and not committed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::consumer_guard::ConsumerGuard;
use crate::codec;
use crate::config::ConsumerConfig;
use crate::error::{DispatchError, DispatchResult, EXIT_FAILURE, EXIT_GRACEFUL};
use crate::lifecycle::{LifecycleController, ShutdownTrigger};
use crate::messaging::{ConsumerCapability, InboundRecord};
use crate::registry::HandlerRegistry;

/// Dispatch loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Initializing,
    Subscribed,
    Polling,
    Dispatching,
    ShuttingDown,
    Closed,
}

/// What happened to a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// All handlers succeeded and the offset was committed
    Committed,
    /// The payload could not be decoded; not committed
    DecodeFailed { error: String },
    /// A handler failed; later handlers were skipped and nothing was committed
    HandlerFailed {
        handler: String,
        position: usize,
        error: String,
    },
}

impl RecordOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RecordOutcome::Committed)
    }
}

/// Counters kept by the dispatch loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub polls: u64,
    pub poll_failures: u64,
    pub records_received: u64,
    pub records_committed: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub commit_failures: u64,
    pub skipped_on_shutdown: u64,
}

/// Summary returned by a dispatch loop that stopped cleanly
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub trigger: Option<ShutdownTrigger>,
    pub stats: DispatchStats,
}

impl ShutdownReport {
    pub fn exit_code(&self) -> i32 {
        match &self.trigger {
            Some(trigger) if !trigger.is_graceful() => EXIT_FAILURE,
            _ => EXIT_GRACEFUL,
        }
    }
}

/// Sequential dispatch loop over one consumer
///
/// Takes ownership of the handler registry; no handler can be added after
/// construction.
pub struct Dispatcher<C: ConsumerCapability> {
    consumer: ConsumerGuard<C>,
    registry: HandlerRegistry,
    lifecycle: LifecycleController,
    poll_timeout: Duration,
    state: DispatchState,
    stats: DispatchStats,
}

impl<C: ConsumerCapability> Dispatcher<C> {
    pub fn new(
        consumer: C,
        registry: HandlerRegistry,
        lifecycle: LifecycleController,
        config: &ConsumerConfig,
    ) -> Self {
        Self {
            consumer: ConsumerGuard::new(consumer),
            registry,
            lifecycle,
            poll_timeout: config.poll_timeout(),
            state: DispatchState::Initializing,
            stats: DispatchStats::default(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Subscribe to every registered topic
    ///
    /// An empty registry is a configuration error: there is nothing to consume.
    pub async fn start(&mut self) -> DispatchResult<()> {
        if self.state != DispatchState::Initializing {
            return Err(DispatchError::internal(format!(
                "dispatch loop cannot start from state {:?}",
                self.state
            )));
        }

        if self.registry.is_empty() {
            return Err(DispatchError::configuration(
                "handler_registry",
                "no handlers registered; refusing to start consuming",
            ));
        }

        let topics = self.registry.topics();
        self.consumer.subscribe(&topics).await?;
        self.state = DispatchState::Subscribed;

        let stats = self.registry.stats();
        info!(
            topics = ?topics,
            handlers = stats.total_handlers,
            provider = self.consumer.provider_name(),
            "🚀 Dispatch loop subscribed"
        );
        Ok(())
    }

    /// Poll once and dispatch the returned batch in order
    ///
    /// Returns the number of records dispatched. Only a commit failure is
    /// returned as an error.
    pub async fn poll_once(&mut self) -> DispatchResult<usize> {
        match self.state {
            DispatchState::Subscribed | DispatchState::Polling => {}
            other => {
                return Err(DispatchError::internal(format!(
                    "cannot poll from state {other:?}"
                )))
            }
        }
        self.state = DispatchState::Polling;

        let records = match self.consumer.poll(self.poll_timeout).await {
            Ok(records) => records,
            Err(e) => {
                self.stats.poll_failures += 1;
                warn!(
                    error = %e,
                    backoff_ms = self.poll_timeout.as_millis() as u64,
                    "Poll failed; backing off before the next attempt"
                );
                // A broker that fails fast must not turn the loop into a busy spin
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_timeout) => {}
                    _ = self.lifecycle.wait_for_shutdown() => {}
                }
                return Ok(0);
            }
        };
        self.stats.polls += 1;

        let batch_size = records.len();
        let mut dispatched = 0;
        for record in records {
            if self.lifecycle.is_shutdown_requested() {
                let skipped = batch_size - dispatched;
                self.stats.skipped_on_shutdown += skipped as u64;
                debug!(
                    skipped = skipped,
                    "Shutdown requested; leaving remaining records uncommitted"
                );
                break;
            }
            self.dispatch_record(record).await?;
            dispatched += 1;
        }

        self.state = DispatchState::Polling;
        Ok(dispatched)
    }

    /// Decode one record, run its handler chain and commit on full success
    pub async fn dispatch_record(&mut self, record: InboundRecord) -> DispatchResult<RecordOutcome> {
        self.state = DispatchState::Dispatching;
        self.stats.records_received += 1;

        let message = match codec::decode_value(&record.payload) {
            Ok(message) => message,
            Err(e) => {
                self.stats.decode_failures += 1;
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "❌ Could not decode record; offset not committed"
                );
                return Ok(RecordOutcome::DecodeFailed {
                    error: e.to_string(),
                });
            }
        };

        let context = record.context();
        let handlers = self.registry.handlers_for(&record.topic);
        if handlers.is_empty() {
            warn!(
                topic = %record.topic,
                offset = record.offset,
                "Record for topic without handlers; committing"
            );
        }

        for (position, registered) in handlers.iter().enumerate() {
            let invocation = AssertUnwindSafe(registered.handler.handle(&context, &message))
                .catch_unwind()
                .await;

            let failure = match invocation {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };

            self.stats.handler_failures += 1;
            let err = DispatchError::handler(&record.topic, &registered.name, &failure);
            error!(
                severity = "critical",
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                handler = %registered.name,
                position = position,
                error = %err,
                "💥 Handler failed; skipping remaining handlers, offset not committed"
            );
            return Ok(RecordOutcome::HandlerFailed {
                handler: registered.name.clone(),
                position,
                error: failure,
            });
        }

        if let Err(e) = self.consumer.commit(&record).await {
            self.stats.commit_failures += 1;
            error!(
                severity = "critical",
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "💥 Commit failed"
            );
            return Err(match e {
                DispatchError::Commit { .. } => e,
                other => DispatchError::commit(
                    &record.topic,
                    record.partition,
                    record.offset,
                    other.to_string(),
                ),
            });
        }

        self.stats.records_committed += 1;
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            handlers = handlers.len(),
            "✅ Record dispatched and committed"
        );
        Ok(RecordOutcome::Committed)
    }

    /// Run until shutdown is requested, then close the consumer
    ///
    /// Returns the error that stopped the loop when it was not a graceful
    /// shutdown (configuration, subscribe or commit failure).
    pub async fn run(mut self) -> DispatchResult<ShutdownReport> {
        if let Err(e) = self.start().await {
            error!(severity = "critical", error = %e, "💥 Dispatch loop failed to start");
            self.lifecycle
                .request_shutdown(ShutdownTrigger::Fatal(e.to_string()));
            self.close().await;
            return Err(e);
        }

        while self.lifecycle.is_running() {
            if let Err(e) = self.poll_once().await {
                error!(severity = "critical", error = %e, "💥 Fatal dispatch error; shutting down");
                self.lifecycle
                    .request_shutdown(ShutdownTrigger::Fatal(e.to_string()));
                self.close().await;
                return Err(e);
            }
        }

        self.close().await;
        Ok(ShutdownReport {
            trigger: self.lifecycle.trigger(),
            stats: self.stats.clone(),
        })
    }

    /// Close the consumer exactly once and mark the lifecycle stopped
    pub async fn close(&mut self) {
        if self.state == DispatchState::Closed {
            return;
        }
        self.state = DispatchState::ShuttingDown;
        info!(provider = self.consumer.provider_name(), "🔄 Closing consumer");

        match self.consumer.close_once().await {
            Ok(true) => info!("Consumer closed"),
            Ok(false) => debug!("Consumer was already closed"),
            Err(e) => warn!(error = %e, "Consumer close reported an error"),
        }

        self.state = DispatchState::Closed;
        self.lifecycle.mark_stopped();
        info!(
            received = self.stats.records_received,
            committed = self.stats.records_committed,
            decode_failures = self.stats.decode_failures,
            handler_failures = self.stats.handler_failures,
            "✅ Dispatch loop closed"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
