use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::state::dataset::{Dataset, ReadState};
use crate::storage::blob::{format, Blob, BlobPayload};

/// Reads `blob` and produces the state it leads to from `current`.
///
/// `current` is never modified; the caller decides when the returned state
/// becomes visible.
pub(crate) fn apply_blob(current: &ReadState, blob: &Blob) -> RelayResult<ReadState> {
    let transition = blob.transition();
    if let Some(from) = blob.from_version() {
        if from != current.version() {
            return Err(RelayError::BlobMismatch {
                transition,
                current: current.version(),
            });
        }
    }

    let reader = blob.open()?;
    let dataset = match format::decode_blob(&transition, reader)? {
        BlobPayload::Snapshot(image) => Dataset::from_image(image),
        BlobPayload::Delta(delta) => delta.apply_to(current.dataset()),
    };

    Ok(ReadState::new(blob.to_version(), Arc::new(dataset)))
}
