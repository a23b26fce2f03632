//! # survey-metrics
//!
//! Derived values and completion progress for yearly library surveys.
//!
//! This crate sits on top of `survey-formula-executor` and exposes what the
//! REST controllers need: operation values per entity and year, completion
//! progress across the establishment → documentary structure → physical
//! library hierarchy, and a write path that keeps cached values coherent.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use survey_formula_executor::{EntityRef, ResultCache};
//! use survey_metrics::{MetricsConfig, SurveyMetrics, ViewerRole};
//!
//! // One cache per process, one service per request
//! let cache = Arc::new(ResultCache::with_capacity(100_000));
//! let metrics = SurveyMetrics::with_shared_cache(&repository, MetricsConfig::default(), cache);
//!
//! let etab = EntityRef::establishment(42);
//! let mean = metrics.evaluate("DepMoy", &etab, 2024);
//! let series = metrics.evaluate_series("DepMoy", &etab, 2019..=2024);
//! let total = metrics.total_progress(&etab, 2024, ViewerRole::Contributor);
//!
//! // Rejected before anything is stored if it would close a cycle
//! metrics.save_formula("DepMoy", "(EtabDepDoc + DepDTot) / 2")?;
//! ```
//!
//! ## Progress
//!
//! Progress is the share of applicable data types that have an answer,
//! rounded half up (2 of 3 gives 67). Totals combine an entity with its
//! whole subtree, either as a flat mean or hierarchically, see
//! [`TotalProgressMode`].
//!
//! ## Feature Flags
//!
//! - `parallel` - Evaluates batches on the rayon thread pool
//! - `serde` - Deserializable [`MetricsConfig`]

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;

mod config;
mod progress;
mod service;
mod total;
mod traits;

// Re-export commonly used types
pub use config::{MetricsConfig, MetricsConfigBuilder, TotalProgressMode};
pub use error::{MetricsError, MetricsResult};
pub use progress::{percentage, ProgressAggregator};
pub use service::{InvalidationReport, SurveyMetrics};
pub use total::TotalProgressAggregator;
pub use traits::{
    EntityHierarchy, ProgressSource, SurveyCatalog, SurveyStore, SurveyWriter, ViewerRole,
};

// Re-export from survey-formula-executor for convenience
pub use survey_formula_executor::{EntityId, EntityKind, EntityRef, SurveyId};
