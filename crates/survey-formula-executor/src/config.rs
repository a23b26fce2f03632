//! Configuration types for the formula executor.

/// How a missing leaf answer referenced by a formula is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MissingValuePolicy {
    /// The whole expression evaluates to null.
    #[default]
    Propagate,
    /// The missing answer counts as zero.
    Zero,
    /// The cell fails with [`EvalError::MissingValue`](crate::EvalError::MissingValue).
    Fail,
}

/// Configuration for the formula executor.
///
/// # Example
///
/// ```rust
/// use survey_formula_executor::{CacheConfig, ExecutorConfig, MissingValuePolicy};
///
/// let config = ExecutorConfig::builder()
///     .with_cache(CacheConfig::default())
///     .with_missing_values(MissingValuePolicy::Zero)
///     .with_parallel(true)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExecutorConfig {
    /// Cache configuration (None = caching disabled).
    pub cache: Option<CacheConfig>,
    /// Missing-answer policy inside formulas.
    pub missing_values: MissingValuePolicy,
    /// Evaluate batches in parallel (requires `parallel` feature).
    pub parallel: bool,
}

impl ExecutorConfig {
    /// Creates a new builder for ExecutorConfig.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for ExecutorConfig.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfigBuilder {
    cache: Option<CacheConfig>,
    missing_values: MissingValuePolicy,
    parallel: bool,
}

impl ExecutorConfigBuilder {
    /// Enables caching with the given configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the missing-answer policy.
    pub fn with_missing_values(mut self, policy: MissingValuePolicy) -> Self {
        self.missing_values = policy;
        self
    }

    /// Enables or disables parallel batch evaluation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Builds the ExecutorConfig.
    pub fn build(self) -> ExecutorConfig {
        ExecutorConfig {
            cache: self.cache,
            missing_values: self.missing_values,
            parallel: self.parallel,
        }
    }
}

/// Configuration for the result cache.
///
/// Entries never expire on their own; they leave the cache through
/// explicit invalidation or LRU eviction once `max_entries` is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Maximum number of cached cells.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}
