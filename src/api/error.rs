use thiserror::Error;

use crate::producer::validation::ValidationStatus;
use crate::types::{TransitionKey, Version};

pub type RelayResult<T> = Result<T, RelayError>;

/// Error type carried out of caller-supplied callbacks and collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("no update plan from {from} to {to}: {reason}")]
    PlanningFailure {
        from: Version,
        to: Version,
        reason: String,
    },

    #[error("transition {transition} failed to apply (consumer reached {reached}): {source}")]
    TransitionFailed {
        transition: TransitionKey,
        reached: Version,
        #[source]
        source: Box<RelayError>,
    },

    #[error("{0}")]
    ValidationFailed(ValidationStatus),

    #[error("populate stage failed for version {version}: {source}")]
    PopulateFailed {
        version: Version,
        #[source]
        source: BoxError,
    },

    #[error("failed to publish {transition}: {source}")]
    PublishFailed {
        transition: TransitionKey,
        #[source]
        source: BoxError,
    },

    #[error("failed to announce version {version}: {source}")]
    AnnouncementFailed {
        version: Version,
        #[source]
        source: BoxError,
    },

    #[error("blob catalog error: {source}")]
    Catalog {
        #[source]
        source: BoxError,
    },

    #[error("invalid transition {transition}: {reason}")]
    InvalidTransition {
        transition: TransitionKey,
        reason: &'static str,
    },

    #[error("blob {transition} corrupted: {reason}")]
    BlobCorrupted {
        transition: TransitionKey,
        reason: String,
    },

    #[error("blob {transition} does not apply to state at version {current}")]
    BlobMismatch {
        transition: TransitionKey,
        current: Version,
    },

    #[error("minted version {minted} must be greater than last committed version {current}")]
    VersionNotIncreasing { minted: Version, current: Version },

    #[error("{component} requires a {name}")]
    MissingCollaborator {
        component: &'static str,
        name: &'static str,
    },

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    #[error("invalid refresh target {target}")]
    InvalidTarget { target: Version },

    #[error("refresh re-entered from a callback of the refresh already running on this thread")]
    ReentrantRefresh,

    #[error("no published version is available")]
    NoVersionAvailable,

    #[error("integrity check failed for version {version}: {reason}")]
    IntegrityCheckFailed { version: Version, reason: String },
}

impl RelayError {
    /// Wraps a collaborator failure (catalog, announcement channel).
    pub fn catalog(source: impl Into<BoxError>) -> Self {
        RelayError::Catalog {
            source: source.into(),
        }
    }

    /// Aggregated validation results, when the error is a validation abort.
    pub fn validation_status(&self) -> Option<&ValidationStatus> {
        match self {
            RelayError::ValidationFailed(status) => Some(status),
            _ => None,
        }
    }

    /// Version the consumer was left at when a transition failed mid-plan.
    pub fn reached_version(&self) -> Option<Version> {
        match self {
            RelayError::TransitionFailed { reached, .. } => Some(*reached),
            _ => None,
        }
    }
}
