//! Traits for formula validation and evaluation.
//!
//! This module defines the read-only collaborator seams the engine needs
//! from persistence: the data type catalog and the stored-answer resolver.
//!
//! # Architecture Note
//!
//! This crate does not know how answers are stored. Implement the traits
//! for your repository type in the application crate, or for an in-memory
//! map in tests.
//!
//! # Example: Implementing the traits over maps
//!
//! ```rust
//! use std::collections::HashMap;
//! use survey_formula_executor::{
//!     DataTypeCatalog, DataTypeInfo, EntityRef, SurveyId, ValueResolver,
//! };
//!
//! struct MemoryStore {
//!     types: HashMap<String, DataTypeInfo>,
//!     values: HashMap<(String, EntityRef, SurveyId), String>,
//! }
//!
//! impl DataTypeCatalog for MemoryStore {
//!     fn data_type(&self, code: &str) -> Option<DataTypeInfo> {
//!         self.types.get(code).cloned()
//!     }
//!
//!     fn operation_codes(&self) -> Vec<String> {
//!         self.types
//!             .values()
//!             .filter(|t| !t.kind.is_leaf())
//!             .map(|t| t.code.clone())
//!             .collect()
//!     }
//! }
//!
//! impl ValueResolver for MemoryStore {
//!     fn resolve(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> Option<String> {
//!         self.values.get(&(code.to_string(), *entity, survey)).cloned()
//!     }
//! }
//! ```

use crate::entity::{EntityRef, SurveyId};

/// Kind of a data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataTypeKind {
    /// Numeric answer.
    Number,
    /// Free text answer.
    Text,
    /// Yes/no answer.
    Boolean,
    /// Derived from a formula; never stored.
    Operation,
}

impl DataTypeKind {
    /// Returns true for directly answered (stored) kinds.
    pub fn is_leaf(self) -> bool {
        !matches!(self, DataTypeKind::Operation)
    }
}

/// Read-only metadata for one data type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataTypeInfo {
    /// Unique symbolic code.
    pub code: String,
    /// Kind of the data type.
    pub kind: DataTypeKind,
    /// Formula text, present for operations only.
    pub formula: Option<String>,
}

impl DataTypeInfo {
    /// Metadata for a stored data type.
    pub fn leaf(code: impl Into<String>, kind: DataTypeKind) -> Self {
        Self {
            code: code.into(),
            kind,
            formula: None,
        }
    }

    /// Metadata for a numeric stored data type.
    pub fn number(code: impl Into<String>) -> Self {
        Self::leaf(code, DataTypeKind::Number)
    }

    /// Metadata for an operation with its formula.
    pub fn operation(code: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind: DataTypeKind::Operation,
            formula: Some(formula.into()),
        }
    }
}

/// Catalog of data types, consumed as read-only metadata.
///
/// # Required Methods
///
/// - [`data_type`](Self::data_type) - Look up a data type by code
/// - [`operation_codes`](Self::operation_codes) - List every operation code
pub trait DataTypeCatalog: Send + Sync {
    /// Looks up a data type by code.
    fn data_type(&self, code: &str) -> Option<DataTypeInfo>;

    /// Codes of every data type of kind operation.
    ///
    /// Used to build the reverse dependency index for cache invalidation.
    fn operation_codes(&self) -> Vec<String>;

    /// Checks if a code exists.
    fn contains(&self, code: &str) -> bool {
        self.data_type(code).is_some()
    }
}

/// Resolves persisted answers.
pub trait ValueResolver: Send + Sync {
    /// Returns the stored string value of a leaf data type for one entity
    /// and survey, or `None` when no answer was recorded.
    fn resolve(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> Option<String>;
}
