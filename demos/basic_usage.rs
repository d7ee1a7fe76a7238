//! Basic usage: publish a few versions, follow them from a consumer, roll
//! back and pin.
//!
//! Run with: cargo run --example basic_usage

use std::sync::Arc;

use blobrelay::producer::CounterVersionMinter;
use blobrelay::types::Version;
use blobrelay::{
    Consumer, ConsumerConfig, InMemoryAnnouncement, InMemoryBlobStore, Producer, ProducerConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Blobrelay Basic Usage Example\n");

    let store = Arc::new(InMemoryBlobStore::new());
    let announcement = Arc::new(InMemoryAnnouncement::new());

    let producer = Producer::new(
        ProducerConfig::new()
            .with_publisher(store.clone())
            .with_announcer(announcement.clone())
            .with_version_minter(Arc::new(CounterVersionMinter::new()))
            .with_num_states_between_snapshots(2),
    )?;

    // Version 1: initial dataset, published as a snapshot.
    let v1 = producer.run_cycle(|state| {
        state.put(b"alice".to_vec(), b"100".to_vec());
        state.put(b"bob".to_vec(), b"50".to_vec());
        Ok(())
    })?;
    println!("Published version {v1} ({} blobs in catalog)", store.blob_count());

    // Version 2: only the change is expressed; the rest carries over.
    let v2 = producer.run_cycle(|state| {
        state.put(b"alice".to_vec(), b"120".to_vec());
        state.remove(b"bob");
        Ok(())
    })?;
    println!("Published version {v2} ({} blobs in catalog)", store.blob_count());

    // Version 3: a new record.
    let v3 = producer.run_cycle(|state| {
        state.put(b"carol".to_vec(), b"75".to_vec());
        Ok(())
    })?;
    println!("Published version {v3} ({} blobs in catalog)\n", store.blob_count());

    let consumer = Consumer::new(
        ConsumerConfig::new()
            .with_blob_retriever(store.clone())
            .with_announcement_watcher(announcement.clone()),
    )?;

    let reached = consumer.refresh()?;
    print_state("Refreshed to latest", &consumer, reached);

    let reached = consumer.refresh_to(v1)?;
    print_state("Rolled back", &consumer, reached);

    announcement.pin(v2);
    let reached = consumer.refresh()?;
    print_state("Pinned", &consumer, reached);

    announcement.unpin();
    let reached = consumer.refresh()?;
    print_state("Unpinned", &consumer, reached);

    let metrics = consumer.metrics().snapshot();
    println!("Consumer metrics:");
    println!("   - Refreshes succeeded: {}", metrics.refreshes_succeeded);
    println!("   - Snapshots applied: {}", metrics.snapshots_applied);
    println!("   - Deltas applied: {}", metrics.deltas_applied);
    println!("   - Health: {:?}", consumer.metrics().health().state);

    Ok(())
}

fn print_state(label: &str, consumer: &Consumer, version: Version) {
    let state = consumer.read_state();
    println!("{label}: version {version}, {} records", state.len());
    for name in ["alice", "bob", "carol"] {
        match state.get(name.as_bytes()) {
            Some(value) => println!("   {name} = {}", String::from_utf8_lossy(value)),
            None => println!("   {name} absent"),
        }
    }
    println!();
}
