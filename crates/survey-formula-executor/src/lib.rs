//! # survey-formula-executor
//!
//! Validation and evaluation engine for survey operation formulas.
//!
//! This crate bridges the [`survey-formula`] parser and whatever store holds
//! the survey answers. It checks formulas before they are persisted,
//! evaluates operations per (code, entity, survey) and keeps computed cells
//! in a shared, invalidatable cache.
//!
//! ## Key Features
//!
//! - **Store agnostic** - implement [`DataTypeCatalog`] and [`ValueResolver`]
//! - **Cycle safe** - write-time cycle rejection plus an evaluation guard
//! - **Configurable caching** - LRU cache of computed cells, invalidated by code
//! - **Optional parallelism** - enable the `parallel` feature for batch evaluation
//!
//! ## Quick Start
//!
//! ```ignore
//! use survey_formula_executor::{EntityRef, FormulaEvaluator, FormulaValidator};
//!
//! // Reject bad formulas before saving them
//! FormulaValidator::new(&store).check("Z", "(X+Y)/2")?;
//!
//! // Evaluate an operation for one establishment and survey
//! let evaluator = FormulaEvaluator::new(&store, &store);
//! let value = evaluator.evaluate("Z", &EntityRef::establishment(1), 2024)?;
//! ```
//!
//! ## With Configuration
//!
//! ```ignore
//! use survey_formula_executor::{CacheConfig, ExecutorConfig, MissingValuePolicy};
//!
//! let config = ExecutorConfig::builder()
//!     .with_cache(CacheConfig { max_entries: 50_000 })
//!     .with_missing_values(MissingValuePolicy::Zero)
//!     .with_parallel(true)
//!     .build();
//!
//! let evaluator = FormulaEvaluator::with_config(&store, &store, config);
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` - Evaluates batches on the rayon thread pool
//! - `serde` - Serialize/Deserialize for configuration and data types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  survey-formula-executor                     │
//! │                                                              │
//! │  FormulaValidator                                            │
//! │  └── charset → parse against catalog → cycle DFS            │
//! │                                                              │
//! │  FormulaEvaluator                                            │
//! │  ├── leaf: resolve stored answer, coerce to number          │
//! │  ├── operation: memo → ResultCache → evaluate formula       │
//! │  └── batch: one cell per entity, failures become null       │
//! │                                                              │
//! │  DependencyGraph                                             │
//! │  └── transitive dependents for cache invalidation           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod cache;
mod config;
mod entity;
mod error;
mod evaluator;
mod graph;
mod traits;
mod validator;

// Public re-exports
pub use cache::{CacheStats, CellValue, ResultCache};
pub use config::{CacheConfig, ExecutorConfig, ExecutorConfigBuilder, MissingValuePolicy};
pub use entity::{AdministrationEntity, EntityId, EntityKind, EntityNode, EntityRef, SurveyId};
pub use error::{EvalError, EvalResult};
pub use evaluator::FormulaEvaluator;
pub use graph::DependencyGraph;
pub use traits::{DataTypeCatalog, DataTypeInfo, DataTypeKind, ValueResolver};
pub use validator::FormulaValidator;

// Re-export commonly used types from dependencies for convenience
pub use survey_formula::{Formula, FormulaError};
