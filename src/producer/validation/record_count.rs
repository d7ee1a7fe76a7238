use crate::error::BoxError;
use crate::producer::validation::{StagedState, ValidationResult, Validator};

const NAME: &str = "RecordCountVarianceValidator";

/// Fails when the record count moves by more than an allowed percentage
/// relative to the last committed state.
#[derive(Debug, Clone)]
pub struct RecordCountVarianceValidator {
    allowable_variance_percent: f64,
}

impl RecordCountVarianceValidator {
    pub fn new(allowable_variance_percent: f64) -> Self {
        Self {
            allowable_variance_percent,
        }
    }

    pub fn allowable_variance_percent(&self) -> f64 {
        self.allowable_variance_percent
    }
}

/// `100 * |latest - previous| / previous`; infinite when growing from zero.
pub fn change_percent(latest: usize, previous: usize) -> f64 {
    if previous == 0 {
        return if latest == 0 { 0.0 } else { f64::INFINITY };
    }
    100.0 * latest.abs_diff(previous) as f64 / previous as f64
}

impl Validator for RecordCountVarianceValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, state: &StagedState<'_>) -> Result<ValidationResult, BoxError> {
        let latest = state.dataset.len();
        let Some(prior) = state.prior else {
            return Ok(ValidationResult::passed(NAME, "no prior state to compare against")
                .with_detail("latest", latest));
        };

        let previous = prior.len();
        let actual = change_percent(latest, previous);
        let result = if actual <= self.allowable_variance_percent {
            ValidationResult::passed(
                NAME,
                format!("record count changed by {actual:.2}%"),
            )
        } else {
            ValidationResult::failed(
                NAME,
                format!(
                    "record count changed by {actual:.2}%, more than the allowed {:.2}%",
                    self.allowable_variance_percent
                ),
            )
        };
        Ok(result
            .with_detail("previous", previous)
            .with_detail("latest", latest)
            .with_detail("allowable_variance_percent", self.allowable_variance_percent))
    }
}
