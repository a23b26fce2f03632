//! Error types for formula validation and evaluation.

use survey_formula::FormulaError;
use thiserror::Error;

/// Errors that can occur while validating or evaluating formulas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Formula text rejected by the parser or the boundary check.
    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),

    /// A code that is not in the data type catalog.
    #[error("unknown data type code: {0}")]
    UnknownCode(String),

    /// Saving the formula would create a dependency cycle.
    #[error("cyclic formula for '{code}': {}", .path.join(" -> "))]
    CyclicFormula {
        /// The operation whose formula closes the cycle.
        code: String,
        /// Dependency path, starting and ending at the same code.
        path: Vec<String>,
    },

    /// A cycle met during evaluation (registry written outside validation).
    #[error("dependency cycle reached while evaluating '{0}'")]
    CycleDetected(String),

    /// Division by zero inside a formula.
    #[error("division by zero in '{code}'")]
    DivisionByZero {
        /// Operation (or ad hoc formula) being evaluated.
        code: String,
    },

    /// Arithmetic left the range of finite numbers.
    #[error("arithmetic overflow in '{code}'")]
    Overflow {
        /// Operation (or ad hoc formula) being evaluated.
        code: String,
    },

    /// A missing answer under the fail-on-missing policy.
    #[error("missing value for '{code}'")]
    MissingValue {
        /// Leaf code without an answer.
        code: String,
    },

    /// A stored answer that cannot be read as a number.
    #[error("value {value:?} of '{code}' is not numeric")]
    NotNumeric {
        /// Leaf code.
        code: String,
        /// The stored text.
        value: String,
    },

    /// An operation without a formula.
    #[error("operation '{0}' has no formula")]
    MissingFormula(String),

    /// A formula was attached to a stored data type.
    #[error("'{0}' is not an operation")]
    NotAnOperation(String),
}

impl EvalError {
    /// Returns true for errors caused by incomplete or odd answers, as
    /// opposed to errors in the formula registry itself.
    pub fn is_cell_error(&self) -> bool {
        matches!(
            self,
            EvalError::DivisionByZero { .. }
                | EvalError::Overflow { .. }
                | EvalError::MissingValue { .. }
                | EvalError::NotNumeric { .. }
        )
    }
}

/// Result type for executor operations.
pub type EvalResult<T> = std::result::Result<T, EvalError>;
