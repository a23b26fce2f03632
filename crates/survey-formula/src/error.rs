//! Error types for formula parsing.

use thiserror::Error;

/// Errors that can occur while checking or parsing a formula.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// Empty input provided.
    #[error("empty formula")]
    EmptyExpression,

    /// Parse error at a specific position in the input.
    #[error("parse error at position {position}: {message}")]
    ParseError {
        /// Byte offset in the input where the error occurred.
        position: usize,
        /// Description of the error, naming the offending token.
        message: String,
    },

    /// The formula references a data type code that does not exist.
    #[error("unknown data type code '{code}' at position {position}")]
    UnknownCode {
        /// The unresolved code.
        code: String,
        /// Byte offset of the identifier.
        position: usize,
    },

    /// A character outside the formula wire alphabet.
    #[error("invalid character {character:?} at position {position}")]
    InvalidCharacter {
        /// Byte offset of the character.
        position: usize,
        /// The rejected character.
        character: char,
    },
}

impl FormulaError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        FormulaError::ParseError {
            position,
            message: message.into(),
        }
    }

    /// Byte offset the error points at, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::EmptyExpression => None,
            FormulaError::ParseError { position, .. }
            | FormulaError::UnknownCode { position, .. }
            | FormulaError::InvalidCharacter { position, .. } => Some(*position),
        }
    }
}

/// Result type for formula operations.
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;
