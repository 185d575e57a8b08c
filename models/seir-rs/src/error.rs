use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeirError>;

/// Errors reported synchronously by every `simulate` entry point.
///
/// None of these are transient: a failed run should not be retried with the
/// same inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeirError {
    /// A rate, fraction, population or time horizon is out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Per-degree-class arrays (or a state vector) have inconsistent lengths.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The integrated trajectory failed a post-integration sanity check.
    #[error("model instability: {0}")]
    ModelInstability(String),

    /// Initial node statuses do not agree with the contact network.
    #[error("graph inconsistency: {0}")]
    GraphInconsistency(String),
}

impl SeirError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SeirError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
