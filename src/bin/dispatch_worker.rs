//! # Dispatch Worker
//!
//! Runnable worker over the in-memory broker. Consumes `nums`, publishes each
//! doubled value to `doubled`, and logs everything arriving on `doubled`.
//! Runs until SIGINT, SIGTERM, SIGQUIT or SIGHUP.

use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch_core::config::ConfigManager;
use dispatch_core::error::{DispatchError, EXIT_FAILURE};
use dispatch_core::logging::{self, init_structured_logging};
use dispatch_core::messaging::{InMemoryBroker, InMemoryProducer, SendResult};
use dispatch_core::publishing::ProducedTopic;
use dispatch_core::registry::HandlerResult;
use dispatch_core::service::DispatchService;
use serde_json::Value;
use tracing::{info, warn};

const SEED_RECORDS: i64 = 5;

type DoubledTopic = ProducedTopic<InMemoryProducer, fn(SendResult) -> SendResult>;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dispatch-worker failed: {e:#}");
            e.downcast_ref::<DispatchError>()
                .map(DispatchError::exit_code)
                .unwrap_or(EXIT_FAILURE)
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let manager = ConfigManager::load().map_err(DispatchError::from)?;
    let config = manager.config().clone();
    let logging_handle = init_structured_logging(&config.logging);

    info!(environment = %manager.environment(), "🚀 Starting dispatch worker");

    let broker = Arc::new(InMemoryBroker::new());
    for n in 1..=SEED_RECORDS {
        broker
            .publish_value("nums", &n)
            .context("failed to seed the in-memory broker")?;
    }

    let consumer = broker
        .consumer()
        .with_max_poll_records(config.consumer.max_poll_records);
    let mut service = DispatchService::new(consumer, Arc::new(broker.producer()), config);

    let doubled: Arc<DoubledTopic> = Arc::new(service.on_produce(
        "doubled",
        report_unacknowledged as fn(SendResult) -> SendResult,
    ));

    service
        .on_consume_async("nums", move |value: Value| {
            double_and_store(Arc::clone(&doubled), value)
        })
        .on_consume("doubled", |value| {
            info!(value = %value, "Stored doubled value");
            Ok(())
        });

    let outcome = service.run().await;
    let code = match outcome {
        Ok(report) => {
            info!(
                trigger = ?report.trigger,
                committed = report.stats.records_committed,
                "✅ Dispatch worker shutdown complete"
            );
            report.exit_code()
        }
        Err(e) => {
            logging::log_error("dispatch_worker", "run", &e.to_string(), None);
            e.exit_code()
        }
    };

    logging_handle.shutdown();
    Ok(code)
}

fn report_unacknowledged(result: SendResult) -> SendResult {
    if !result.is_success() {
        warn!(result = %result.to_json(), "Doubled value was not acknowledged");
    }
    result
}

async fn double_and_store(doubled: Arc<DoubledTopic>, value: Value) -> HandlerResult {
    let n = value.as_i64().ok_or("expected an integer")?;
    let result = doubled.call(&(n * 2)).await;
    if result.is_success() {
        Ok(())
    } else {
        Err(result.error.unwrap_or_default().into())
    }
}
