//! # Blobrelay
//!
//! Distribution of one versioned, read-only dataset from a producer to many
//! consumers as a chain of immutable blobs.
//!
//! ## Features
//!
//! - **Snapshots and deltas**: every version is published as a forward delta
//!   and a reverse delta, plus periodic full snapshots
//! - **Cheap refresh**: consumers plan the shortest transition path to any
//!   published version, forwards or backwards
//! - **Self-healing**: transitions that fail to apply are blacklisted and
//!   planned around on the next refresh
//! - **Operational controls**: version pinning and single-producer leadership
//! - **Integrity**: blake3 checksums on every blob, optional zstd compression
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use blobrelay::*;
//!
//! let store = Arc::new(InMemoryBlobStore::new());
//! let announcement = Arc::new(InMemoryAnnouncement::new());
//!
//! let producer = Producer::new(
//!     ProducerConfig::new()
//!         .with_publisher(store.clone())
//!         .with_announcer(announcement.clone()),
//! )?;
//! producer.run_cycle(|state| {
//!     state.put(b"answer".to_vec(), b"42".to_vec());
//!     Ok(())
//! })?;
//!
//! let consumer = Consumer::new(
//!     ConsumerConfig::new()
//!         .with_blob_retriever(store)
//!         .with_announcement_watcher(announcement),
//! )?;
//! consumer.refresh()?;
//! assert_eq!(consumer.read_state().get(b"answer"), Some(&b"42"[..]));
//! # Ok::<(), blobrelay::error::RelayError>(())
//! ```

pub mod api;
pub mod consumer;
pub mod producer;
pub mod runtime;
pub mod state;
pub mod storage;

pub use crate::api::{error, types};
pub use crate::runtime::metrics;

pub use api::error::{BoxError, RelayError, RelayResult};
pub use api::types::*;
pub use consumer::{
    Consumer, ConsumerConfig, ConsumerRefreshMetrics, FailedTransitionTracker, FailurePolicy,
    RefreshListener, RefreshMetricsListener, UpdatePlan, UpdatePlanner,
};
pub use producer::{
    BasicSingleProducerEnforcer, CycleReport, CycleStatus, IncrementalProducer, InlineExecutor,
    Producer, ProducerConfig, ProducerListener, RecordCountVarianceValidator,
    SingleProducerEnforcer, SnapshotPublishExecutor, StagedState, ThreadExecutor,
    ValidationResult, ValidationResultType, ValidationStatus, Validator, VersionMinter,
};
pub use runtime::metrics::{
    ConsumerMetrics, ConsumerMetricsSnapshot, HealthState, HealthStatus, MetricsCollector,
    ProducerMetrics, ProducerMetricsSnapshot,
};
pub use state::{Dataset, ReadState, WriteState};
pub use storage::announcement::{
    AnnouncementWatcher, Announcer, FilesystemAnnouncement, InMemoryAnnouncement,
};
pub use storage::blob::{Blob, BlobSource, BytesSource, CodecOptions, FileSource};
pub use storage::catalog::{BlobPublisher, BlobRetriever, FilesystemBlobStore, InMemoryBlobStore};
