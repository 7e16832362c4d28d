#![allow(dead_code)]

pub mod strategies;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dispatch_core::config::{ConsumerConfig, DispatchConfig, ProducerConfig};
use dispatch_core::messaging::InMemoryBroker;

pub use strategies::*;

/// Upper bound for any single wait in integration tests
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

pub fn fast_consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        poll_timeout_ms: 10,
        ..ConsumerConfig::default()
    }
}

pub fn producer_config(ack_timeout_ms: u64) -> ProducerConfig {
    ProducerConfig {
        ack_timeout_ms,
        ..ProducerConfig::default()
    }
}

/// Service configuration that never installs process signal handlers
pub fn quiet_service_config() -> DispatchConfig {
    let mut config = DispatchConfig::default();
    config.consumer = fast_consumer_config();
    config.lifecycle.install_signal_handlers = false;
    config
}

pub fn new_broker() -> Arc<InMemoryBroker> {
    Arc::new(InMemoryBroker::new())
}

/// Poll `condition` until it holds, panicking after [`TEST_DEADLINE`]
pub async fn wait_until<F>(description: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(TEST_DEADLINE, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {description}");
}

/// Await a future, panicking after [`TEST_DEADLINE`]
pub async fn within_deadline<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(TEST_DEADLINE, future)
        .await
        .expect("future did not complete within the test deadline")
}
