//! Validators run against a populated but uncommitted state.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::BoxError;
use crate::runtime::listeners::panic_message;
use crate::state::{Dataset, ReadState};
use crate::types::Version;

pub mod record_count;

pub use record_count::RecordCountVarianceValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationResultType {
    Passed,
    /// The validator rejected the data.
    Failed,
    /// The validator itself errored or panicked.
    Error,
}

impl fmt::Display for ValidationResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationResultType::Passed => "PASSED",
            ValidationResultType::Failed => "FAILED",
            ValidationResultType::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub name: String,
    pub result_type: ValidationResultType,
    pub message: String,
    pub details: Vec<(String, String)>,
}

impl ValidationResult {
    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_type(name, ValidationResultType::Passed, message)
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_type(name, ValidationResultType::Failed, message)
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_type(name, ValidationResultType::Error, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }

    pub fn is_passed(&self) -> bool {
        self.result_type == ValidationResultType::Passed
    }

    fn with_type(
        name: impl Into<String>,
        result_type: ValidationResultType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            result_type,
            message: message.into(),
            details: Vec::new(),
        }
    }
}

/// Aggregated outcome of every validator run in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStatus {
    results: Vec<ValidationResult>,
}

impl ValidationStatus {
    pub fn new(results: Vec<ValidationResult>) -> Self {
        Self { results }
    }

    pub fn passed(&self) -> bool {
        self.results.iter().all(ValidationResult::is_passed)
    }

    /// Results that were not `Passed`.
    pub fn failed(&self) -> impl Iterator<Item = &ValidationResult> + '_ {
        self.results.iter().filter(|result| !result.is_passed())
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed:")?;
        for result in self.failed() {
            write!(f, " [{} {}: {}]", result.result_type, result.name, result.message)?;
        }
        Ok(())
    }
}

/// Populated state offered to validators.
#[derive(Debug, Clone, Copy)]
pub struct StagedState<'a> {
    pub version: Version,
    pub dataset: &'a Dataset,
    /// Last committed state; `None` on the first cycle.
    pub prior: Option<&'a ReadState>,
}

pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    /// Returning `Err` (or panicking) records an `Error` result.
    fn validate(&self, state: &StagedState<'_>) -> Result<ValidationResult, BoxError>;
}

pub(crate) fn run_validators(
    validators: &[Arc<dyn Validator>],
    state: &StagedState<'_>,
) -> ValidationStatus {
    let results = validators
        .iter()
        .map(|validator| {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| validator.validate(state)));
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => ValidationResult::error(validator.name(), err.to_string()),
                Err(panic) => ValidationResult::error(
                    validator.name(),
                    format!("validator panicked: {}", panic_message(panic.as_ref())),
                ),
            };
            if result.is_passed() {
                debug!(validator = %result.name, version = %state.version, "Validator passed");
            } else {
                warn!(
                    validator = %result.name,
                    version = %state.version,
                    outcome = %result.result_type,
                    message = %result.message,
                    "Validator rejected state"
                );
            }
            result
        })
        .collect();
    ValidationStatus::new(results)
}
