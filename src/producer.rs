//! Producer side: the publish cycle and its collaborators.

pub mod config;
pub mod cycle;
pub mod enforcer;
pub mod executor;
pub mod incremental;
pub mod listener;
pub mod validation;
pub mod version;

pub use config::ProducerConfig;
pub use cycle::Producer;
pub use enforcer::{BasicSingleProducerEnforcer, SingleProducerEnforcer};
pub use executor::{InlineExecutor, PublishTask, SnapshotPublishExecutor, ThreadExecutor};
pub use incremental::IncrementalProducer;
pub use listener::{CycleReport, CycleStatus, ProducerListener};
pub use validation::{
    RecordCountVarianceValidator, StagedState, ValidationResult, ValidationResultType,
    ValidationStatus, Validator,
};
pub use version::{CounterVersionMinter, TimestampVersionMinter, VersionMinter};
