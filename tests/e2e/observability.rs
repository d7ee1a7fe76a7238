use std::sync::{Arc, Mutex};

use blobrelay::error::RelayResult;
use blobrelay::types::{BlobType, TransitionKey};
use blobrelay::{
    ConsumerConfig, ConsumerRefreshMetrics, CycleStatus, HealthState, ProducerConfig,
    RefreshMetricsListener,
};

use super::e2e_support::{
    init_tracing, put_value, v, CountingCollector, RecordingProducerListener, RelayHarness,
};

#[test]
fn e2e_producer_listeners_observe_cycle_stages() -> RelayResult<()> {
    init_tracing();

    let listener = Arc::new(RecordingProducerListener::default());
    let harness = RelayHarness::with_config(ProducerConfig::new().with_listener(listener.clone()));

    harness.publish(1)?;
    harness.producer.run_cycle(|_| Ok(()))?;
    harness.publish(2)?;

    assert_eq!(
        listener.events(),
        vec![
            "start 1".to_string(),
            "validated 1 passed=true".to_string(),
            "published SNAPSHOT(-> 1)".to_string(),
            "announced 1 ok=true".to_string(),
            "start 2".to_string(),
            "no delta 2".to_string(),
            "start 3".to_string(),
            "validated 3 passed=true".to_string(),
            "published DELTA(1 -> 3)".to_string(),
            "published REVERSE_DELTA(3 -> 1)".to_string(),
            "published SNAPSHOT(-> 3)".to_string(),
            "announced 3 ok=true".to_string(),
        ]
    );

    let statuses: Vec<_> = listener.reports().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![CycleStatus::Succeeded, CycleStatus::Unchanged, CycleStatus::Succeeded]
    );
    assert_eq!(listener.reports()[1].committed, v(1));
    Ok(())
}

#[test]
fn e2e_skipped_cycles_are_reported() -> RelayResult<()> {
    init_tracing();

    let listener = Arc::new(RecordingProducerListener::default());
    let harness = RelayHarness::with_config(ProducerConfig::new().with_listener(listener.clone()));
    harness.publish(1)?;

    harness.producer.enforcer().disable();
    assert_eq!(harness.publish(2)?, v(1));
    assert_eq!(listener.events().last().cloned(), Some("skipped at 1".to_string()));

    let metrics = harness.producer.metrics().snapshot();
    assert_eq!(metrics.cycles_skipped, 1);
    assert_eq!(metrics.cycles_succeeded, 1);
    assert_eq!(harness.announcement.announced_version(), v(1));
    Ok(())
}

#[test]
fn e2e_producer_metrics_and_health() -> RelayResult<()> {
    init_tracing();

    let collector = Arc::new(CountingCollector::default());
    let harness = RelayHarness::with_config(
        ProducerConfig::new()
            .with_num_states_between_snapshots(1)
            .with_metrics_collector(collector.clone()),
    );
    assert_eq!(harness.producer.metrics().health().state, HealthState::Idle);

    for value in 1..=3 {
        harness.publish(value)?;
    }
    let metrics = harness.producer.metrics().snapshot();
    assert_eq!(metrics.cycles_completed, 3);
    assert_eq!(metrics.cycles_succeeded, 3);
    // Snapshots at 1 and 3.
    assert_eq!(metrics.snapshots_published, 2);
    assert_eq!(metrics.deltas_published, 2);
    assert_eq!(metrics.reverse_deltas_published, 2);
    assert_eq!(metrics.last_published_version, v(3));
    assert_eq!(metrics.total_records, 4);
    assert_eq!(collector.calls(), 3);
    assert_eq!(harness.producer.metrics().health().state, HealthState::Healthy);

    for _ in 0..3 {
        let failed = harness
            .producer
            .run_cycle(|_| Err("source offline".into()));
        assert!(failed.is_err());
    }
    let health = harness.producer.metrics().health();
    assert_eq!(health.state, HealthState::Unhealthy);
    assert_eq!(health.consecutive_failures, 3);

    harness.producer.run_cycle(put_value(9))?;
    assert_ne!(
        harness.producer.metrics().health().state,
        HealthState::Unhealthy
    );
    Ok(())
}

#[test]
fn e2e_refresh_metrics_listener_reports_each_refresh() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(5);
    for value in 1..=3 {
        harness.publish(value)?;
    }

    let reports: Arc<Mutex<Vec<ConsumerRefreshMetrics>>> = Arc::default();
    let sink = Arc::clone(&reports);
    let listener = Arc::new(RefreshMetricsListener::new(move |metrics| {
        sink.lock().unwrap().push(metrics.clone());
    }));
    let consumer = harness.consumer_with(ConsumerConfig::new().with_refresh_listener(listener));

    consumer.refresh_to(v(1))?;
    consumer.refresh_to(v(3))?;

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 2);

    let initial = &reports[0];
    assert!(initial.is_refresh_success);
    assert!(initial.is_initial_load);
    assert_eq!(initial.overall_refresh_type, Some(BlobType::Snapshot));
    assert_eq!(initial.plan.num_successful_transitions, 1);

    let incremental = &reports[1];
    assert!(!incremental.is_initial_load);
    assert_eq!(incremental.overall_refresh_type, Some(BlobType::Delta));
    assert_eq!(incremental.plan.before_version, v(1));
    assert_eq!(incremental.plan.desired_version, v(3));
    assert_eq!(
        incremental.plan.transition_sequence,
        vec![BlobType::Delta, BlobType::Delta]
    );
    assert_eq!(incremental.refresh_success_age, Some(std::time::Duration::ZERO));
    Ok(())
}

#[test]
fn e2e_consumer_health_tracks_blacklist() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    harness.publish(1)?;
    harness.publish(2)?;

    let consumer = harness.consumer();
    assert_eq!(consumer.metrics().health().state, HealthState::Idle);
    consumer.refresh()?;
    assert_eq!(consumer.metrics().health().state, HealthState::Healthy);

    consumer
        .failed_transitions()
        .mark_transition_failed(TransitionKey::delta(v(2), v(3)));
    harness.publish(3)?;
    consumer.refresh()?;

    let snapshot = consumer.metrics().snapshot();
    assert_eq!(snapshot.current_version, v(3));
    assert_eq!(snapshot.blacklisted_deltas, 1);
    assert_eq!(consumer.metrics().health().state, HealthState::Degraded);
    Ok(())
}
