//! Error types for the metrics crate.

use survey_formula_executor::EvalError;

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur while computing metrics or writing survey data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    /// Formula validation or evaluation error.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// The backing store refused a write.
    #[error("Store error: {0}")]
    Store(String),

    /// The code cannot change while operations reference it.
    #[error("Code {code} is referenced by {}", .referenced_by.join(", "))]
    CodeInUse {
        /// The code that was about to change.
        code: String,
        /// Operations whose formula references it.
        referenced_by: Vec<String>,
    },

    /// Operation values are derived and never stored.
    #[error("Code {0} is an operation; its value cannot be written")]
    ReadOnlyCode(String),
}

impl MetricsError {
    /// Creates a store error from any displayable store failure.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
