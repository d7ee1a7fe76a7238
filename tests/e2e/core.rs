use std::sync::Arc;

use blobrelay::error::{RelayError, RelayResult};
use blobrelay::producer::{
    CounterVersionMinter, StagedState, ValidationResult, ValidationResultType, Validator,
};
use blobrelay::types::{BlobType, TransitionKey, Version};
use blobrelay::{BlobRetriever, BoxError, ConsumerConfig, Producer, ProducerConfig};

use super::e2e_support::{
    init_tracing, put_value, v, value_at, RecordingRefreshListener, RelayHarness,
};

#[test]
fn e2e_first_version_bootstraps_consumer() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    assert_eq!(harness.publish(1)?, v(1));
    assert_eq!(harness.store.snapshot_versions(), vec![v(1)]);

    let consumer = harness.consumer();
    assert_eq!(consumer.current_version(), Version::NONE);
    assert_eq!(consumer.refresh()?, v(1));
    assert_eq!(value_at(&consumer.read_state()), Some(1));

    Ok(())
}

#[test]
fn e2e_delta_chain_from_single_snapshot() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(2);
    for value in 1..=3 {
        harness.publish(value)?;
    }
    assert_eq!(harness.store.snapshot_versions(), vec![v(1)]);

    let listener = Arc::new(RecordingRefreshListener::default());
    let consumer =
        harness.consumer_with(ConsumerConfig::new().with_refresh_listener(listener.clone()));
    assert_eq!(consumer.refresh_to(v(3))?, v(3));

    assert_eq!(
        listener.planned(),
        vec![vec![BlobType::Snapshot, BlobType::Delta, BlobType::Delta]]
    );
    assert_eq!(
        listener.events(),
        vec![
            "started none -> 3".to_string(),
            "loaded SNAPSHOT(-> 1)".to_string(),
            "loaded DELTA(1 -> 2)".to_string(),
            "loaded DELTA(2 -> 3)".to_string(),
            "succeeded none -> 3".to_string(),
        ]
    );

    let state = consumer.read_state();
    assert_eq!(value_at(&state), Some(3));
    assert_eq!(state.len(), 4);
    assert_eq!(
        state.dataset().checksum(),
        harness.producer.read_state().dataset().checksum()
    );

    Ok(())
}

#[test]
fn e2e_rollback_follows_reverse_deltas_without_snapshot() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(2);
    for value in 1..=3 {
        harness.publish(value)?;
    }

    let listener = Arc::new(RecordingRefreshListener::default());
    let consumer =
        harness.consumer_with(ConsumerConfig::new().with_refresh_listener(listener.clone()));
    consumer.refresh_to(v(3))?;

    assert!(harness.store.remove_snapshot(v(1)));
    assert_eq!(consumer.refresh_to(v(1))?, v(1));
    assert_eq!(
        listener.planned().last().cloned(),
        Some(vec![BlobType::ReverseDelta, BlobType::ReverseDelta])
    );

    let state = consumer.read_state();
    assert_eq!(value_at(&state), Some(1));
    assert_eq!(state.len(), 2);

    Ok(())
}

#[test]
fn e2e_pin_overrides_newer_announcements() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    harness.publish(1)?;
    harness.announcement.pin(v(1));
    for value in 2..=4 {
        harness.publish(value)?;
    }
    assert_eq!(harness.announcement.announced_version(), v(4));

    let consumer = harness.consumer();
    assert_eq!(consumer.refresh()?, v(1));
    // An explicit target does not escape the pin either.
    assert_eq!(consumer.refresh_to(v(3))?, v(1));
    assert_eq!(value_at(&consumer.read_state()), Some(1));

    harness.announcement.unpin();
    assert_eq!(consumer.refresh()?, v(4));
    assert_eq!(value_at(&consumer.read_state()), Some(4));

    Ok(())
}

struct MaxValue(u8);

impl Validator for MaxValue {
    fn name(&self) -> &str {
        "max-value"
    }

    fn validate(&self, state: &StagedState<'_>) -> Result<ValidationResult, BoxError> {
        let value = state.dataset.get(&[0]).map(|bytes| bytes[0]).unwrap_or(0);
        if value > self.0 {
            Ok(ValidationResult::failed(
                "max-value",
                format!("value {value} exceeds {}", self.0),
            ))
        } else {
            Ok(ValidationResult::passed("max-value", "ok"))
        }
    }
}

#[test]
fn e2e_failed_validation_does_not_poison_producer() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    harness.producer.add_validator(Arc::new(MaxValue(5)));

    assert_eq!(harness.publish(1)?, v(1));

    let err = harness.publish(9).unwrap_err();
    let status = match &err {
        RelayError::ValidationFailed(status) => status,
        other => panic!("expected validation failure, got {other:?}"),
    };
    assert_eq!(status.results().len(), 1);
    assert_eq!(status.results()[0].result_type, ValidationResultType::Failed);
    assert_eq!(status.results()[0].message, "value 9 exceeds 5");
    assert_eq!(harness.producer.last_committed_version(), v(1));
    assert_eq!(harness.announcement.announced_version(), v(1));

    // Version 2 was consumed by the failed cycle.
    assert_eq!(harness.publish(3)?, v(3));
    let consumer = harness.consumer();
    assert_eq!(consumer.refresh()?, v(3));
    assert_eq!(value_at(&consumer.read_state()), Some(3));

    Ok(())
}

#[test]
fn e2e_restored_producer_continues_lineage() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    harness.publish(1)?;
    harness.publish(2)?;

    let consumer = harness.consumer();
    consumer.refresh()?;

    // A replacement producer on the same catalog and channel.
    let successor = Producer::new(
        ProducerConfig::new()
            .with_publisher(harness.store.clone())
            .with_announcer(harness.announcement.clone())
            .with_version_minter(Arc::new(CounterVersionMinter::starting_at(3))),
    )?;
    let restored = successor.restore(v(2), harness.store.as_ref())?;
    assert_eq!(value_at(&restored), Some(2));
    assert_eq!(
        restored.dataset().checksum(),
        consumer.read_state().dataset().checksum()
    );

    assert_eq!(successor.run_cycle(put_value(3))?, v(3));
    let delta = harness
        .store
        .retrieve_delta_blob(v(2))?
        .expect("delta from the restored version");
    assert_eq!(delta.transition(), TransitionKey::delta(v(2), v(3)));

    // Existing consumers keep following deltas across the handover.
    assert_eq!(consumer.refresh()?, v(3));
    assert_eq!(value_at(&consumer.read_state()), Some(3));
    assert_eq!(consumer.metrics().snapshot().deltas_applied, 1);

    Ok(())
}
