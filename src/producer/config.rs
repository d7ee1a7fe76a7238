use std::fmt;
use std::sync::Arc;

use crate::producer::enforcer::{BasicSingleProducerEnforcer, SingleProducerEnforcer};
use crate::producer::executor::{InlineExecutor, SnapshotPublishExecutor};
use crate::producer::listener::ProducerListener;
use crate::producer::validation::Validator;
use crate::producer::version::{TimestampVersionMinter, VersionMinter};
use crate::runtime::metrics::{MetricsCollector, ProducerMetrics};
use crate::storage::announcement::Announcer;
use crate::storage::blob::CodecOptions;
use crate::storage::catalog::BlobPublisher;

/// Configuration for a [`Producer`](crate::producer::Producer).
#[derive(Clone)]
pub struct ProducerConfig {
    /// Where staged blobs go (required)
    pub publisher: Option<Arc<dyn BlobPublisher>>,
    /// Announcement channel; cycles publish without announcing when absent
    pub announcer: Option<Arc<dyn Announcer>>,
    pub version_minter: Arc<dyn VersionMinter>,
    pub enforcer: Arc<dyn SingleProducerEnforcer>,
    /// Runs snapshot publications after the first one
    pub snapshot_executor: Arc<dyn SnapshotPublishExecutor>,
    /// Delta-only cycles between two snapshots; 0 snapshots every cycle
    pub num_states_between_snapshots: u32,
    pub validators: Vec<Arc<dyn Validator>>,
    pub listeners: Vec<Arc<dyn ProducerListener>>,
    pub metrics_collector: Option<Arc<dyn MetricsCollector<ProducerMetrics>>>,
    pub codec: CodecOptions,
    /// Re-applies staged deltas before publishing and compares checksums
    pub integrity_check: bool,
}

impl ProducerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn BlobPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_announcer(mut self, announcer: Arc<dyn Announcer>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    pub fn with_version_minter(mut self, minter: Arc<dyn VersionMinter>) -> Self {
        self.version_minter = minter;
        self
    }

    pub fn with_enforcer(mut self, enforcer: Arc<dyn SingleProducerEnforcer>) -> Self {
        self.enforcer = enforcer;
        self
    }

    pub fn with_snapshot_executor(mut self, executor: Arc<dyn SnapshotPublishExecutor>) -> Self {
        self.snapshot_executor = executor;
        self
    }

    pub fn with_num_states_between_snapshots(mut self, states: u32) -> Self {
        self.num_states_between_snapshots = states;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProducerListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_metrics_collector(
        mut self,
        collector: Arc<dyn MetricsCollector<ProducerMetrics>>,
    ) -> Self {
        self.metrics_collector = Some(collector);
        self
    }

    /// Compresses blob payloads with zstd at `level`.
    pub fn with_compression(mut self, level: i32) -> Self {
        self.codec = CodecOptions {
            compress: true,
            compression_level: level,
        };
        self
    }

    pub fn without_integrity_check(mut self) -> Self {
        self.integrity_check = false;
        self
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            publisher: None,
            announcer: None,
            version_minter: Arc::new(TimestampVersionMinter::new()),
            enforcer: Arc::new(BasicSingleProducerEnforcer::new()),
            snapshot_executor: Arc::new(InlineExecutor),
            num_states_between_snapshots: 0,
            validators: Vec::new(),
            listeners: Vec::new(),
            metrics_collector: None,
            codec: CodecOptions::default(),
            integrity_check: true,
        }
    }
}

impl fmt::Debug for ProducerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerConfig")
            .field("publisher", &self.publisher.is_some())
            .field("announcer", &self.announcer.is_some())
            .field(
                "num_states_between_snapshots",
                &self.num_states_between_snapshots,
            )
            .field("validators", &self.validators.len())
            .field("listeners", &self.listeners.len())
            .field("codec", &self.codec)
            .field("integrity_check", &self.integrity_check)
            .finish_non_exhaustive()
    }
}
