use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use blobrelay::error::RelayResult;
use blobrelay::producer::ThreadExecutor;
use blobrelay::{Consumer, ConsumerConfig, IncrementalProducer, ProducerConfig};

use super::e2e_support::{init_tracing, v, value_at, RelayHarness};

const FINAL_VERSION: u64 = 20;
const ELEMENTS: u32 = 2_000;
const WRITERS: u32 = 4;

fn id_key(id: u32) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

#[test]
fn e2e_readers_see_whole_versions_during_refresh() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(4);
    harness.publish(1)?;

    let consumer = Arc::new(harness.consumer());
    consumer.refresh()?;

    let barrier = Arc::new(Barrier::new(3));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let consumer = Arc::clone(&consumer);
            let barrier = Arc::clone(&barrier);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                barrier.wait();
                let mut last_seen = 0u64;
                while !done.load(Ordering::Acquire) {
                    let state = consumer.read_state();
                    let version = state.version().get();
                    assert!(version >= last_seen, "versions went backwards");
                    // Each version v holds value v under [0] and v + 1 records.
                    assert_eq!(value_at(&state), Some(version as u8));
                    assert_eq!(state.len() as u64, version + 1);
                    last_seen = version;
                }
                last_seen
            })
        })
        .collect();

    barrier.wait();
    for value in 2..=FINAL_VERSION as u8 {
        harness.publish(value)?;
        consumer.refresh()?;
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        let last_seen = reader.join().expect("reader thread panicked");
        assert!(last_seen <= FINAL_VERSION);
    }
    assert_eq!(consumer.current_version(), v(FINAL_VERSION));
    Ok(())
}

#[test]
fn e2e_concurrent_refreshes_are_single_flight() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    for value in 1..=5 {
        harness.publish(value)?;
    }

    let consumer = Arc::new(harness.consumer());
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let consumer = Arc::clone(&consumer);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                consumer.refresh()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("refresh thread panicked")?, v(5));
    }

    // Only the first refresh moved state; the rest found it current.
    let metrics = consumer.metrics().snapshot();
    assert_eq!(metrics.refreshes_succeeded, 1);
    assert_eq!(metrics.transitions_applied, 1);
    Ok(())
}

#[test]
fn e2e_subscribed_consumer_follows_announcements() -> RelayResult<()> {
    init_tracing();

    let harness = RelayHarness::new(0);
    let consumer: Arc<Consumer> = Arc::new(harness.consumer());
    consumer.subscribe()?;

    harness.publish(1)?;
    harness.publish(2)?;
    assert_eq!(consumer.current_version(), v(2));

    harness.announcement.pin(v(1));
    assert_eq!(consumer.current_version(), v(1));

    harness.announcement.unpin();
    assert_eq!(consumer.current_version(), v(2));
    Ok(())
}

#[test]
fn e2e_background_snapshot_publication() -> RelayResult<()> {
    init_tracing();

    let executor = Arc::new(ThreadExecutor::new("e2e"));
    let harness = RelayHarness::with_config(
        ProducerConfig::new().with_snapshot_executor(executor.clone()),
    );

    for value in 1..=3 {
        harness.publish(value)?;
    }
    executor.wait();

    assert_eq!(harness.store.snapshot_versions(), vec![v(1), v(2), v(3)]);
    assert_eq!(harness.producer.metrics().snapshot().snapshots_published, 3);
    Ok(())
}

#[test]
fn e2e_incremental_changes_from_many_threads_publish_once() -> RelayResult<()> {
    init_tracing();

    let RelayHarness {
        store,
        announcement,
        producer,
    } = RelayHarness::new(0);
    producer.run_cycle(|state| {
        for id in 0..ELEMENTS {
            state.put(id_key(id), id_key(id));
        }
        Ok(())
    })?;

    // Lower half untouched; upper half split between modifying and
    // deleting writers, each owning a disjoint slice of keys.
    let incremental = Arc::new(IncrementalProducer::new(producer));
    let half = ELEMENTS / 2;
    let slice = half / WRITERS;
    let barrier = Arc::new(Barrier::new(WRITERS as usize));
    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let incremental = Arc::clone(&incremental);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let ids = half + writer * slice..half + (writer + 1) * slice;
                if writer % 2 == 0 {
                    for id in ids {
                        incremental.add_or_modify(id_key(id), id_key(id + 1));
                    }
                } else {
                    incremental.delete_all(ids.map(id_key));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread panicked");
    }
    assert_eq!(incremental.pending_len(), half as usize);

    let version = incremental.run_cycle()?;
    assert_eq!(version, v(2));
    assert!(!incremental.has_changes());
    assert_eq!(announcement.announced_version(), v(2));

    let consumer = Consumer::new(
        ConsumerConfig::new()
            .with_blob_retriever(store.clone())
            .with_announcement_watcher(announcement.clone()),
    )?;
    consumer.refresh_to(v(1))?;
    assert_eq!(consumer.refresh()?, version);

    let state = consumer.read_state();
    assert_eq!(state.len() as u32, ELEMENTS - half / 2);
    for id in 0..half {
        assert_eq!(state.get(&id_key(id)), Some(&id_key(id)[..]));
    }
    for writer in 0..WRITERS {
        for id in half + writer * slice..half + (writer + 1) * slice {
            let value = state.get(&id_key(id));
            if writer % 2 == 0 {
                assert_eq!(value, Some(&id_key(id + 1)[..]));
            } else {
                assert_eq!(value, None);
            }
        }
    }
    Ok(())
}
