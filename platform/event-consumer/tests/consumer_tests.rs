//! Consumer runner behavior against the in-memory bus

use event_bus::{EventBus, EventEnvelope, EventPublisher, InMemoryBus, RedeliveryPolicy};
use event_consumer::{handler_fn, start_consumer, ConsumerSpec, DeadLetter, HandlerError};
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

fn fast_policy(max_deliver: u32) -> RedeliveryPolicy {
    RedeliveryPolicy {
        max_deliver,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        ack_wait: Duration::from_millis(500),
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn handler_sees_decoded_envelope_and_message_is_acked() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("media.snapshot.created", "vision").with_policy(fast_policy(3)),
        handler_fn(move |envelope| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().unwrap().push(envelope);
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    let tenant = Uuid::new_v4();
    let sent = EventPublisher::new(bus.clone(), "camera")
        .publish("media.snapshot.created", tenant, json!({"camera_id": "cam-7"}), None)
        .await
        .unwrap();

    wait_until(|| seen.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "acked message must not be redelivered");
    assert_eq!(seen[0].event_id, sent.event_id);
    assert_eq!(seen[0].tenant_id, tenant);
    assert_eq!(seen[0].data["camera_id"], "cam-7");
}

#[tokio::test]
async fn every_subscribed_group_receives_the_envelope() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let notifier_hits = Arc::new(AtomicU32::new(0));
    let ops_hits = Arc::new(AtomicU32::new(0));

    for (group, counter) in [("notifier", notifier_hits.clone()), ("ops", ops_hits.clone())] {
        start_consumer(
            bus.clone(),
            ConsumerSpec::new("vision.assessment.created", group).with_policy(fast_policy(3)),
            handler_fn(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();
    }

    EventPublisher::new(bus.clone(), "reasoner")
        .publish("vision.assessment.created", Uuid::new_v4(), json!({}), None)
        .await
        .unwrap();

    wait_until(|| {
        notifier_hits.load(Ordering::SeqCst) == 1 && ops_hits.load(Ordering::SeqCst) == 1
    })
    .await;
}

#[tokio::test]
async fn members_of_one_group_split_the_work() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let handled = Arc::new(Mutex::new(Vec::new()));

    for member in 0..3u32 {
        let handled = handled.clone();
        start_consumer(
            bus.clone(),
            ConsumerSpec::new("report.requested", "reporting").with_policy(fast_policy(3)),
            handler_fn(move |envelope| {
                let handled = handled.clone();
                async move {
                    handled.lock().unwrap().push((member, envelope.event_id));
                    Ok(())
                }
            }),
        )
        .await
        .unwrap();
    }

    let publisher = EventPublisher::new(bus.clone(), "reporting");
    let tenant = Uuid::new_v4();
    for _ in 0..20 {
        publisher
            .publish("report.requested", tenant, json!({}), None)
            .await
            .unwrap();
    }

    wait_until(|| handled.lock().unwrap().len() >= 20).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let handled = handled.lock().unwrap();
    assert_eq!(handled.len(), 20);
    let mut ids: Vec<Uuid> = handled.iter().map(|(_, id)| *id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20, "each envelope handled by exactly one member");
}

#[tokio::test]
async fn retriable_failure_is_redelivered_with_next_attempt() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let calls = Arc::new(AtomicU32::new(0));

    let calls_clone = calls.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("ops.task.generated", "notifier").with_policy(fast_policy(5)),
        handler_fn(move |_| {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HandlerError::Retriable("storage unavailable".into()))
                } else {
                    Ok(())
                }
            }
        }),
    )
    .await
    .unwrap();

    EventPublisher::new(bus.clone(), "ops")
        .publish("ops.task.generated", Uuid::new_v4(), json!({}), None)
        .await
        .unwrap();

    wait_until(|| calls.load(Ordering::SeqCst) == 3).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_redelivery_lands_on_dead_letter_subject() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let mut dlq = bus.subscribe("dlq.>").await.unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let calls_clone = calls.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("report.requested", "reporting").with_policy(fast_policy(3)),
        handler_fn(move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Retriable("always down".into()))
            }
        }),
    )
    .await
    .unwrap();

    let sent = EventPublisher::new(bus.clone(), "reporting")
        .publish("report.requested", Uuid::new_v4(), json!({"report_id": "r1"}), None)
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), dlq.next())
        .await
        .expect("dead letter published")
        .unwrap();
    assert_eq!(msg.subject, "dlq.report.requested");

    let letter: DeadLetter = serde_json::from_slice(&msg.payload).unwrap();
    assert_eq!(letter.attempt, 3);
    assert_eq!(letter.group, "reporting");
    assert_eq!(letter.error, "always down");
    let original: EventEnvelope<serde_json::Value> = serde_json::from_value(letter.payload).unwrap();
    assert_eq!(original.event_id, sent.event_id);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3, "no delivery after dead-letter");
}

#[tokio::test]
async fn permanent_failure_skips_retries() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let mut dlq = bus.subscribe("dlq.>").await.unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let calls_clone = calls.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("ops.rule.proposed", "notifier").with_policy(fast_policy(5)),
        handler_fn(move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::Permanent("unknown rule shape".into()))
            }
        }),
    )
    .await
    .unwrap();

    EventPublisher::new(bus.clone(), "ops")
        .publish("ops.rule.proposed", Uuid::new_v4(), json!({}), None)
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), dlq.next())
        .await
        .unwrap()
        .unwrap();
    let letter: DeadLetter = serde_json::from_slice(&msg.payload).unwrap();
    assert_eq!(letter.attempt, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_envelope_is_dead_lettered_without_calling_handler() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let mut dlq = bus.subscribe("dlq.>").await.unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let calls_clone = calls.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("report.requested", "reporting").with_policy(fast_policy(5)),
        handler_fn(move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    bus.publish("report.requested", b"{not an envelope".to_vec())
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), dlq.next())
        .await
        .unwrap()
        .unwrap();
    let letter: DeadLetter = serde_json::from_slice(&msg.payload).unwrap();
    assert!(letter.error.starts_with("malformed envelope"));
    assert_eq!(letter.payload, json!("{not an envelope"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn handler_past_ack_deadline_is_retried() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let calls = Arc::new(AtomicU32::new(0));

    let policy = RedeliveryPolicy {
        ack_wait: Duration::from_millis(50),
        ..fast_policy(5)
    };

    let calls_clone = calls.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("report.requested", "reporting").with_policy(policy),
        handler_fn(move |_| {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    EventPublisher::new(bus.clone(), "reporting")
        .publish("report.requested", Uuid::new_v4(), json!({}), None)
        .await
        .unwrap();

    wait_until(|| calls.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test]
async fn envelope_with_invalid_metadata_is_dead_lettered() {
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let mut dlq = bus.subscribe("dlq.>").await.unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let calls_clone = calls.clone();
    start_consumer(
        bus.clone(),
        ConsumerSpec::new("report.requested", "reporting").with_policy(fast_policy(5)),
        handler_fn(move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    // Well-formed JSON that would deserialize, but names no producer.
    let raw = json!({
        "event_id": Uuid::new_v4(),
        "event_type": "report.requested",
        "tenant_id": Uuid::new_v4(),
        "occurred_at": "2026-05-04T12:00:00Z",
        "producer": "",
        "correlation_id": Uuid::new_v4(),
        "data": {"report_id": Uuid::new_v4()}
    });
    bus.publish("report.requested", serde_json::to_vec(&raw).unwrap())
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), dlq.next())
        .await
        .unwrap()
        .unwrap();
    let letter: DeadLetter = serde_json::from_slice(&msg.payload).unwrap();
    assert_eq!(letter.error, "malformed envelope: producer cannot be empty");
    assert_eq!(letter.attempt, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
