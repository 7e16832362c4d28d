//! End-to-end dispatch loop behaviour over the in-memory broker.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use dispatch_core::dispatch::{Dispatcher, RecordOutcome};
use dispatch_core::error::{DispatchError, EXIT_CONFIG, EXIT_FAILURE, EXIT_GRACEFUL};
use dispatch_core::lifecycle::{LifecycleController, LifecycleState, ShutdownTrigger};
use dispatch_core::messaging::{
    ConsumerCapability, InMemoryBroker, InboundRecord, RecordContext,
};
use dispatch_core::registry::{HandlerRegistry, HandlerResult, MessageHandler};
use parking_lot::Mutex;
use serde_json::{json, Value};

const POLL_ONCE: std::time::Duration = std::time::Duration::from_millis(20);

fn dispatcher(
    broker: &Arc<InMemoryBroker>,
    registry: HandlerRegistry,
    lifecycle: &LifecycleController,
) -> Dispatcher<dispatch_core::messaging::InMemoryConsumer> {
    Dispatcher::new(
        broker.consumer(),
        registry,
        lifecycle.clone(),
        &fast_consumer_config(),
    )
}

#[tokio::test]
async fn test_double_and_store_commits_every_record() {
    let broker = new_broker();
    let lifecycle = LifecycleController::new();
    let store = Arc::new(Mutex::new(Vec::new()));

    let mut registry = HandlerRegistry::new();
    let sink = Arc::clone(&store);
    registry.register_typed("nums", move |n: i64| {
        sink.lock().push(n * 2);
        Ok(())
    });

    for n in [1, 2, 3] {
        broker.publish_value("nums", &n).unwrap();
    }

    let worker = tokio::spawn(dispatcher(&broker, registry, &lifecycle).run());
    wait_until("three commits", || broker.commit_log().len() == 3).await;
    lifecycle.request_shutdown(ShutdownTrigger::Requested("test complete".to_string()));

    let report = within_deadline(worker).await.unwrap().unwrap();

    assert_eq!(*store.lock(), vec![2, 4, 6]);
    assert_eq!(broker.committed_offset("nums", 0), Some(3));
    assert_eq!(report.stats.records_committed, 3);
    assert_eq!(report.exit_code(), EXIT_GRACEFUL);
    assert_eq!(broker.consumer_close_count(), 1);
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_failing_second_handler_blocks_commit_and_skips_third() {
    let broker = new_broker();
    let lifecycle = LifecycleController::new();
    let first_seen = Arc::new(Mutex::new(Vec::new()));
    let third_seen = Arc::new(Mutex::new(Vec::new()));

    let mut registry = HandlerRegistry::new();
    let first = Arc::clone(&first_seen);
    registry.register_fn("events", move |value| {
        first.lock().push(value.clone());
        Ok(())
    });
    registry.register_fn("events", |value| {
        if value["kind"] == "poison" {
            Err("cannot process poison event".into())
        } else {
            Ok(())
        }
    });
    let third = Arc::clone(&third_seen);
    registry.register_fn("events", move |value| {
        third.lock().push(value.clone());
        Ok(())
    });

    broker.publish_value("events", &json!({"kind": "created"})).unwrap();
    broker.publish_value("events", &json!({"kind": "poison"})).unwrap();
    broker.publish_value("events", &json!({"kind": "deleted"})).unwrap();

    let worker = tokio::spawn(dispatcher(&broker, registry, &lifecycle).run());
    wait_until("two commits", || broker.commit_log().len() == 2).await;
    // Give the loop a chance to misbehave before stopping it
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    lifecycle.request_shutdown(ShutdownTrigger::Requested("test complete".to_string()));
    let report = within_deadline(worker).await.unwrap().unwrap();

    assert_eq!(first_seen.lock().len(), 3);
    assert_eq!(
        *third_seen.lock(),
        vec![json!({"kind": "created"}), json!({"kind": "deleted"})]
    );

    let committed: Vec<i64> = broker.commit_log().iter().map(|m| m.offset).collect();
    assert_eq!(committed, vec![0, 2]);
    assert_eq!(report.stats.handler_failures, 1);
    assert_eq!(report.stats.records_received, 3);
    assert_eq!(report.exit_code(), EXIT_GRACEFUL);

    // The poison record holds the watermark, so a restart sees it again
    assert_eq!(broker.committed_offset("events", 0), Some(1));
    let mut restarted = broker.consumer();
    restarted.subscribe(&["events".to_string()]).await.unwrap();
    let redelivered = restarted.poll(POLL_ONCE).await.unwrap();
    assert_eq!(redelivered[0].offset, 1);
    assert_eq!(
        dispatch_core::codec::decode_value(&redelivered[0].payload).unwrap(),
        json!({"kind": "poison"})
    );
}

#[tokio::test]
async fn test_handlers_run_in_registration_order_with_identical_value() {
    let broker = new_broker();
    let calls: Arc<Mutex<Vec<(usize, Value)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut registry = HandlerRegistry::new();
    for position in 0..4 {
        let calls = Arc::clone(&calls);
        registry.register_fn("ordered", move |value| {
            calls.lock().push((position, value.clone()));
            Ok(())
        });
    }

    let mut dispatcher = dispatcher(&broker, registry, &LifecycleController::new());
    dispatcher.start().await.unwrap();

    let message = json!({"id": 9, "tags": ["a", "b"], "nested": {"ok": true}});
    broker.publish_value("ordered", &message).unwrap();
    assert_eq!(dispatcher.poll_once().await.unwrap(), 1);

    let calls = calls.lock();
    let positions: Vec<usize> = calls.iter().map(|(p, _)| *p).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
    assert!(calls.iter().all(|(_, value)| *value == message));
}

/// Checks that every earlier record is committed before the next one arrives
struct CommitWatcher {
    broker: Arc<InMemoryBroker>,
    violations: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for CommitWatcher {
    async fn handle(&self, context: &RecordContext, _message: &Value) -> HandlerResult {
        let committed = self
            .broker
            .committed_offset(&context.topic, context.partition)
            .unwrap_or(0);
        if committed != context.offset {
            self.violations
                .lock()
                .push(format!("{context}: committed watermark {committed}"));
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "commit_watcher"
    }
}

#[tokio::test]
async fn test_commit_precedes_next_record() {
    let broker = new_broker();
    let watcher = Arc::new(CommitWatcher {
        broker: Arc::clone(&broker),
        violations: Mutex::new(Vec::new()),
    });

    let mut registry = HandlerRegistry::new();
    registry.register("nums", watcher.clone());

    for n in 0..10 {
        broker.publish_value("nums", &n).unwrap();
    }

    let mut dispatcher = dispatcher(&broker, registry, &LifecycleController::new());
    dispatcher.start().await.unwrap();
    assert_eq!(dispatcher.poll_once().await.unwrap(), 10);

    assert!(watcher.violations.lock().is_empty(), "{:?}", watcher.violations.lock());
    assert_eq!(broker.committed_offset("nums", 0), Some(10));
}

#[tokio::test]
async fn test_decode_failure_is_skipped_and_loop_continues() {
    let broker = new_broker();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    let sink = Arc::clone(&seen);
    registry.register_fn("nums", move |value| {
        sink.lock().push(value.clone());
        Ok(())
    });

    broker.append("nums", b"%%% not a payload %%%".to_vec());
    broker.publish_value("nums", &7).unwrap();

    let mut dispatcher = dispatcher(&broker, registry, &LifecycleController::new());
    dispatcher.start().await.unwrap();
    assert_eq!(dispatcher.poll_once().await.unwrap(), 2);

    assert_eq!(*seen.lock(), vec![json!(7)]);
    let committed: Vec<i64> = broker.commit_log().iter().map(|m| m.offset).collect();
    assert_eq!(committed, vec![1]);
    assert_eq!(broker.committed_offset("nums", 0), Some(0));
    assert_eq!(dispatcher.stats().decode_failures, 1);
}

#[tokio::test]
async fn test_single_record_outcomes() {
    let broker = new_broker();
    let mut registry = HandlerRegistry::new();
    registry.register_fn("nums", |_| Ok(()));
    registry.register_fn("nums", |_| Err("second handler refuses".into()));

    let mut dispatcher = dispatcher(&broker, registry, &LifecycleController::new());
    dispatcher.start().await.unwrap();

    let payload = dispatch_core::codec::encode(&1).unwrap();
    let outcome = dispatcher
        .dispatch_record(InboundRecord::new("nums", 0, 0, payload))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RecordOutcome::HandlerFailed {
            handler: "nums#1".to_string(),
            position: 1,
            error: "second handler refuses".to_string(),
        }
    );
    assert!(broker.commit_log().is_empty());
}

#[tokio::test]
async fn test_commit_failure_is_fatal() {
    let broker = new_broker();
    broker.set_fail_commits(true);
    let lifecycle = LifecycleController::new();

    let mut registry = HandlerRegistry::new();
    registry.register_fn("nums", |_| Ok(()));
    broker.publish_value("nums", &1).unwrap();
    broker.publish_value("nums", &2).unwrap();

    let err = within_deadline(dispatcher(&broker, registry, &lifecycle).run())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Commit { offset: 0, .. }));
    assert!(err.is_fatal());
    assert_eq!(err.exit_code(), EXIT_FAILURE);
    assert_eq!(broker.consumer_close_count(), 1);
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert!(matches!(lifecycle.trigger(), Some(ShutdownTrigger::Fatal(_))));
}

#[tokio::test]
async fn test_empty_registry_refuses_to_consume() {
    let broker = new_broker();
    broker.publish_value("nums", &1).unwrap();
    let lifecycle = LifecycleController::new();

    let err = within_deadline(dispatcher(&broker, HandlerRegistry::new(), &lifecycle).run())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Configuration { .. }));
    assert_eq!(err.exit_code(), EXIT_CONFIG);
    assert!(broker.commit_log().is_empty());
    assert_eq!(broker.consumer_close_count(), 1);
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}
