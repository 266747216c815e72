use crate::model::Population;
use thiserror::Error;

/// Failures of a single simulation run.
///
/// Both variants are deterministic: re-running with the same configuration
/// reproduces the same error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// The configuration was rejected before any state was allocated.
    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A population total used as a divisor reached zero.
    #[error("total {population} population is zero at step {step}")]
    ModelDegeneracy { step: usize, population: Population },
}

impl ModelError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
