//! Error types for the Gamma-Poisson background model.

use thiserror::Error;

/// Failure kinds raised by the model.
///
/// Public functions return `anyhow::Result`; match on a specific kind with
/// `err.downcast_ref::<GammaPoissonError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GammaPoissonError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Numerical non-convergence: {reason}")]
    NumericalNonConvergence { reason: String },
}

impl GammaPoissonError {
    pub(crate) fn invalid(reason: impl Into<String>) -> anyhow::Error {
        GammaPoissonError::InvalidInput {
            reason: reason.into(),
        }
        .into()
    }

    pub(crate) fn non_convergence(reason: impl Into<String>) -> anyhow::Error {
        GammaPoissonError::NumericalNonConvergence {
            reason: reason.into(),
        }
        .into()
    }
}
