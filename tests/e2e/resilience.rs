use std::sync::Arc;

use blobrelay::error::{RelayError, RelayResult};
use blobrelay::types::{BlobType, TransitionKey, Version};
use blobrelay::producer::CounterVersionMinter;
use blobrelay::{
    Consumer, ConsumerConfig, FailedTransitionTracker, FailurePolicy, InMemoryAnnouncement,
    InMemoryBlobStore, Producer, ProducerConfig,
};

use super::e2e_support::{
    init_tracing, put_value, v, value_at, CorruptingRetriever, FailingPublisher,
    RelayHarness,
};

#[test]
fn e2e_corrupt_delta_is_blacklisted_and_planned_around() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(2);
    for value in 1..=4 {
        harness.publish(value)?;
    }
    // Snapshots at 1 and 4; deltas 1->2->3->4.
    assert_eq!(harness.store.snapshot_versions(), vec![v(1), v(4)]);

    let retriever = Arc::new(CorruptingRetriever::new(harness.store.clone()));
    retriever.corrupt(TransitionKey::delta(v(2), v(3)));

    let consumer = Consumer::new(
        ConsumerConfig::new()
            .with_blob_retriever(retriever.clone())
            .with_failure_policy(FailurePolicy::BlacklistBlob),
    )?;
    consumer.refresh_to(v(2))?;

    let err = consumer.refresh_to(v(4)).unwrap_err();
    assert_eq!(err.reached_version(), Some(v(2)));
    assert!(matches!(
        &err,
        RelayError::TransitionFailed { transition, .. } if *transition == TransitionKey::delta(v(2), v(3))
    ));
    assert_eq!(consumer.current_version(), v(2));
    assert_eq!(value_at(&consumer.read_state()), Some(2));
    assert!(consumer
        .failed_transitions()
        .is_failed(&TransitionKey::delta(v(2), v(3))));

    // The retry anchors on the snapshot at 4 instead.
    assert_eq!(consumer.refresh_to(v(4))?, v(4));
    assert_eq!(value_at(&consumer.read_state()), Some(4));
    assert!(retriever.served_corrupt() >= 1);

    let health = consumer.metrics().health();
    assert_eq!(health.blacklisted_transitions, 1);
    Ok(())
}

#[test]
fn e2e_cleared_blacklist_makes_transition_eligible_again() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    harness.publish(1)?;
    harness.publish(2)?;

    let tracker = Arc::new(FailedTransitionTracker::new());
    tracker.mark_transition_failed(TransitionKey::snapshot(v(2)));
    tracker.mark_transition_failed(TransitionKey::delta(v(1), v(2)));

    let consumer =
        harness.consumer_with(ConsumerConfig::new().with_failed_transitions(tracker.clone()));
    consumer.refresh_to(v(1))?;
    let err = consumer.refresh_to(v(2)).unwrap_err();
    assert!(matches!(err, RelayError::PlanningFailure { .. }));
    assert_eq!(consumer.current_version(), v(1));

    tracker.clear();
    assert_eq!(consumer.refresh_to(v(2))?, v(2));
    Ok(())
}

#[test]
fn e2e_failed_publish_rolls_back_cycle() -> RelayResult<()> {
    init_tracing();

    let store = Arc::new(InMemoryBlobStore::new());
    let announcement = Arc::new(InMemoryAnnouncement::new());
    let publisher = Arc::new(FailingPublisher::new(store.clone(), BlobType::ReverseDelta));
    let producer = Producer::new(
        ProducerConfig::new()
            .with_publisher(publisher.clone())
            .with_announcer(announcement.clone())
            .with_version_minter(Arc::new(CounterVersionMinter::new())),
    )?;

    producer.run_cycle(put_value(1))?;
    publisher.arm(true);
    let err = producer.run_cycle(put_value(2)).unwrap_err();
    assert!(matches!(
        &err,
        RelayError::PublishFailed { transition, .. } if transition.blob_type == BlobType::ReverseDelta
    ));
    assert_eq!(producer.last_committed_version(), v(1));
    assert_eq!(announcement.announced_version(), v(1));

    publisher.arm(false);
    assert_eq!(producer.run_cycle(put_value(3))?, v(3));

    // The orphaned delta 1->2 was superseded by 1->3.
    let consumer = Consumer::new(ConsumerConfig::new().with_blob_retriever(store.clone()))?;
    consumer.refresh_to(v(1))?;
    assert_eq!(consumer.refresh_to(v(3))?, v(3));
    assert_eq!(value_at(&consumer.read_state()), Some(3));
    Ok(())
}

#[test]
fn e2e_unknown_target_fails_without_moving() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    harness.publish(1)?;

    let consumer = harness.consumer();
    consumer.refresh()?;
    let err = consumer.refresh_to(v(42)).unwrap_err();
    assert!(matches!(err, RelayError::PlanningFailure { to, .. } if to == v(42)));
    assert_eq!(consumer.current_version(), v(1));

    let err = consumer.refresh_to(Version::NONE).unwrap_err();
    assert!(matches!(err, RelayError::InvalidTarget { .. }));
    Ok(())
}

#[test]
fn e2e_empty_catalog_has_no_latest_version() {
    init_tracing();

    let harness = RelayHarness::new(0);
    let consumer = harness.consumer();
    let err = consumer.refresh().unwrap_err();
    assert!(matches!(err, RelayError::NoVersionAvailable));
}
