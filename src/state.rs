//! Dataset materialization: read-side snapshots, the write-side populate
//! handle, and delta computation between two states.

pub mod dataset;
pub mod delta;
pub(crate) mod transition;
pub mod write;

pub use dataset::{Dataset, ReadState, SnapshotImage};
pub use delta::{DatasetDelta, DeltaStats, StagedTransition};
pub use write::WriteState;

pub mod prelude {
    pub use super::dataset::{Dataset, ReadState};
    pub use super::delta::DatasetDelta;
    pub use super::write::WriteState;
}
