//! Configuration for the metrics facade.

use survey_formula_executor::{CacheConfig, ExecutorConfig, MissingValuePolicy};

/// How an entity's total progress combines the progress of its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TotalProgressMode {
    /// Arithmetic mean over every entity of the subtree, each counted once.
    #[default]
    Flat,
    /// Each node averages its own progress with the mean of its children's
    /// subtree progress.
    Hierarchical,
}

/// Configuration for [`SurveyMetrics`](crate::SurveyMetrics).
///
/// The default enables the result cache with [`CacheConfig::default`].
///
/// # Example
///
/// ```rust
/// use survey_metrics::{MetricsConfig, TotalProgressMode};
/// use survey_formula_executor::MissingValuePolicy;
///
/// let config = MetricsConfig::builder()
///     .with_cache_size(50_000)
///     .with_missing_values(MissingValuePolicy::Zero)
///     .with_total_progress(TotalProgressMode::Hierarchical)
///     .build();
///
/// assert_eq!(config.executor.cache.unwrap().max_entries, 50_000);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MetricsConfig {
    /// Evaluation settings, including the cache.
    pub executor: ExecutorConfig,
    /// Total progress composition.
    pub total_progress: TotalProgressMode,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::builder()
                .with_cache(CacheConfig::default())
                .build(),
            total_progress: TotalProgressMode::default(),
        }
    }
}

impl MetricsConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> MetricsConfigBuilder {
        MetricsConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for MetricsConfig.
#[derive(Debug, Clone)]
pub struct MetricsConfigBuilder {
    config: MetricsConfig,
}

impl MetricsConfigBuilder {
    /// Replaces the whole executor configuration.
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.config.executor = executor;
        self
    }

    /// Sets the cache capacity.
    pub fn with_cache_size(mut self, max_entries: usize) -> Self {
        self.config.executor.cache = Some(CacheConfig { max_entries });
        self
    }

    /// Disables the result cache.
    pub fn without_cache(mut self) -> Self {
        self.config.executor.cache = None;
        self
    }

    /// Sets the missing-answer policy.
    pub fn with_missing_values(mut self, policy: MissingValuePolicy) -> Self {
        self.config.executor.missing_values = policy;
        self
    }

    /// Enables or disables parallel batch evaluation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.config.executor.parallel = parallel;
        self
    }

    /// Sets the total progress composition.
    pub fn with_total_progress(mut self, mode: TotalProgressMode) -> Self {
        self.config.total_progress = mode;
        self
    }

    /// Builds the MetricsConfig.
    pub fn build(self) -> MetricsConfig {
        self.config
    }
}
