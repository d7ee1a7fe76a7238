//! Public API surface shared by producers and consumers.
//!
//! This module groups lightweight value types and the crate-wide error so
//! collaborators (catalogs, announcers, validators) can be written without
//! pulling in the producer or consumer machinery.

pub mod error;
pub mod types;

pub mod prelude {
    pub use super::error::{BoxError, RelayError, RelayResult};
    pub use super::types::*;
}
