#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use blobrelay::error::{BoxError, RelayError, RelayResult};
use blobrelay::types::{BlobType, TransitionKey, Version};
use blobrelay::{
    Blob, BlobPublisher, BlobRetriever, BytesSource, Consumer, ConsumerConfig, CycleReport,
    InMemoryAnnouncement, InMemoryBlobStore, MetricsCollector, Producer, ProducerConfig,
    ProducerListener, ReadState, RefreshListener, WriteState,
};
use blobrelay::producer::CounterVersionMinter;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn v(raw: u64) -> Version {
    Version::new(raw)
}

/// One producer and any number of consumers sharing an in-memory catalog
/// and announcement channel. Versions are minted 1, 2, 3, ...
pub struct RelayHarness {
    pub store: Arc<InMemoryBlobStore>,
    pub announcement: Arc<InMemoryAnnouncement>,
    pub producer: Producer,
}

impl RelayHarness {
    pub fn new(num_states_between_snapshots: u32) -> Self {
        Self::with_config(
            ProducerConfig::new().with_num_states_between_snapshots(num_states_between_snapshots),
        )
    }

    /// `config` is completed with the harness catalog, announcer and minter.
    pub fn with_config(config: ProducerConfig) -> Self {
        let store = Arc::new(InMemoryBlobStore::new());
        let announcement = Arc::new(InMemoryAnnouncement::new());
        let producer = Producer::new(
            config
                .with_publisher(store.clone())
                .with_announcer(announcement.clone())
                .with_version_minter(Arc::new(CounterVersionMinter::new())),
        )
        .expect("producer config");
        Self {
            store,
            announcement,
            producer,
        }
    }

    pub fn consumer(&self) -> Consumer {
        self.consumer_with(ConsumerConfig::new())
    }

    pub fn consumer_with(&self, config: ConsumerConfig) -> Consumer {
        Consumer::new(
            config
                .with_blob_retriever(self.store.clone())
                .with_announcement_watcher(self.announcement.clone()),
        )
        .expect("consumer config")
    }

    /// Publishes one version holding `value` under key `[0]` and the
    /// cumulative records `[1..=value]`.
    pub fn publish(&self, value: u8) -> RelayResult<Version> {
        self.producer.run_cycle(put_value(value))
    }
}

pub fn put_value(value: u8) -> impl FnOnce(&mut WriteState<'_>) -> Result<(), BoxError> {
    move |state| {
        state.put(vec![0u8], vec![value]);
        state.put(vec![value], vec![value; 4]);
        Ok(())
    }
}

pub fn value_at(state: &ReadState) -> Option<u8> {
    state.get(&[0]).map(|bytes| bytes[0])
}

/// Catalog wrapper that serves garbage for selected transitions.
pub struct CorruptingRetriever {
    inner: Arc<InMemoryBlobStore>,
    corrupt: Mutex<Vec<TransitionKey>>,
    served_corrupt: AtomicUsize,
}

impl CorruptingRetriever {
    pub fn new(inner: Arc<InMemoryBlobStore>) -> Self {
        Self {
            inner,
            corrupt: Mutex::new(Vec::new()),
            served_corrupt: AtomicUsize::new(0),
        }
    }

    pub fn corrupt(&self, key: TransitionKey) {
        self.corrupt.lock().unwrap().push(key);
    }

    pub fn served_corrupt(&self) -> usize {
        self.served_corrupt.load(Ordering::SeqCst)
    }

    fn filter(&self, blob: Option<Blob>) -> Option<Blob> {
        let blob = blob?;
        if self.corrupt.lock().unwrap().contains(&blob.transition()) {
            self.served_corrupt.fetch_add(1, Ordering::SeqCst);
            return Some(blob.with_source(Arc::new(BytesSource::new(b"not a blob".to_vec()))));
        }
        Some(blob)
    }
}

impl BlobRetriever for CorruptingRetriever {
    fn retrieve_snapshot_blob(&self, max_version: Version) -> RelayResult<Option<Blob>> {
        Ok(self.filter(self.inner.retrieve_snapshot_blob(max_version)?))
    }

    fn retrieve_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>> {
        Ok(self.filter(self.inner.retrieve_delta_blob(from)?))
    }

    fn retrieve_reverse_delta_blob(&self, from: Version) -> RelayResult<Option<Blob>> {
        Ok(self.filter(self.inner.retrieve_reverse_delta_blob(from)?))
    }
}

/// Publisher that rejects blobs of one type while armed.
pub struct FailingPublisher {
    inner: Arc<InMemoryBlobStore>,
    fail_type: BlobType,
    armed: Mutex<bool>,
}

impl FailingPublisher {
    pub fn new(inner: Arc<InMemoryBlobStore>, fail_type: BlobType) -> Self {
        Self {
            inner,
            fail_type,
            armed: Mutex::new(false),
        }
    }

    pub fn arm(&self, armed: bool) {
        *self.armed.lock().unwrap() = armed;
    }
}

impl BlobPublisher for FailingPublisher {
    fn publish(&self, blob: &Blob) -> RelayResult<()> {
        if *self.armed.lock().unwrap() && blob.blob_type() == self.fail_type {
            return Err(RelayError::catalog(format!(
                "catalog rejected {}",
                blob.transition()
            )));
        }
        self.inner.publish(blob)
    }
}

#[derive(Default)]
pub struct RecordingRefreshListener {
    events: Mutex<Vec<String>>,
    planned: Mutex<Vec<Vec<BlobType>>>,
}

impl RecordingRefreshListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn planned(&self) -> Vec<Vec<BlobType>> {
        self.planned.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl RefreshListener for RecordingRefreshListener {
    fn refresh_started(&self, current: Version, requested: Version) {
        self.push(format!("started {current} -> {requested}"));
    }

    fn transitions_planned(
        &self,
        _current: Version,
        _desired: Version,
        _is_snapshot_plan: bool,
        transitions: &[BlobType],
    ) {
        self.planned.lock().unwrap().push(transitions.to_vec());
    }

    fn blob_loaded(&self, transition: &TransitionKey) {
        self.push(format!("loaded {transition}"));
    }

    fn refresh_successful(&self, before: Version, after: Version, _requested: Version) {
        self.push(format!("succeeded {before} -> {after}"));
    }

    fn refresh_failed(
        &self,
        before: Version,
        reached: Version,
        _requested: Version,
        _error: &RelayError,
    ) {
        self.push(format!("failed {before} -> {reached}"));
    }
}

#[derive(Default)]
pub struct RecordingProducerListener {
    events: Mutex<Vec<String>>,
    reports: Mutex<Vec<CycleReport>>,
}

impl RecordingProducerListener {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<CycleReport> {
        self.reports.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProducerListener for RecordingProducerListener {
    fn cycle_start(&self, version: Version) {
        self.push(format!("start {version}"));
    }

    fn cycle_skipped(&self, committed: Version) {
        self.push(format!("skipped at {committed}"));
    }

    fn validation_complete(
        &self,
        version: Version,
        status: &blobrelay::producer::ValidationStatus,
    ) {
        self.push(format!("validated {version} passed={}", status.passed()));
    }

    fn blob_published(&self, transition: &TransitionKey) {
        self.push(format!("published {transition}"));
    }

    fn announcement_complete(&self, version: Version, result: Result<(), &RelayError>) {
        self.push(format!("announced {version} ok={}", result.is_ok()));
    }

    fn no_delta_available(&self, version: Version) {
        self.push(format!("no delta {version}"));
    }

    fn cycle_complete(&self, report: &CycleReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Counts how often metrics were handed over.
#[derive(Default)]
pub struct CountingCollector {
    calls: AtomicUsize,
}

impl CountingCollector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<M> MetricsCollector<M> for CountingCollector {
    fn collect(&self, _metrics: &M) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
