//! Survey metrics service with a shared result cache.
//!
//! This module provides the facade controllers talk to: derived values,
//! completion progress and the write path that keeps cached values coherent.
//!
//! # Example
//!
//! ```ignore
//! use survey_metrics::{SurveyMetrics, ViewerRole};
//! use survey_formula_executor::EntityRef;
//!
//! let metrics = SurveyMetrics::new(&store);
//! let etab = EntityRef::establishment(1);
//!
//! // Derived value of an operation
//! let mean = metrics.evaluate("DepMoy", &etab, 2024);
//!
//! // Writes invalidate every dependent operation before returning
//! metrics.upsert_value("DepDTot", &etab, 2024, "1200")?;
//!
//! // Completion of the establishment and everything it owns
//! let total = metrics.total_progress(&etab, 2024, ViewerRole::Contributor);
//! ```

mod types;

pub use types::InvalidationReport;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use survey_formula_executor::{
    CellValue, DataTypeKind, DependencyGraph, EntityId, EntityKind, EntityRef, EvalError,
    ExecutorConfig, FormulaEvaluator, FormulaValidator, ResultCache, SurveyId,
};
use tracing::{debug, info};

use crate::config::MetricsConfig;
use crate::error::{MetricsError, MetricsResult};
use crate::progress::ProgressAggregator;
use crate::total::TotalProgressAggregator;
use crate::traits::{SurveyStore, ViewerRole};

/// Derived values and progress over one survey store.
///
/// The service is cheap to construct; create one per request around a
/// process-wide cache with [`with_shared_cache`](Self::with_shared_cache).
pub struct SurveyMetrics<'a, S: SurveyStore> {
    store: &'a S,
    config: MetricsConfig,
    cache: Option<Arc<ResultCache>>,
}

impl<'a, S: SurveyStore> SurveyMetrics<'a, S> {
    /// Creates a service with default configuration and its own cache.
    pub fn new(store: &'a S) -> Self {
        Self::with_config(store, MetricsConfig::default())
    }

    /// Creates a service with custom configuration.
    ///
    /// A private cache is created when `config.executor.cache` is set.
    pub fn with_config(store: &'a S, config: MetricsConfig) -> Self {
        let cache = config
            .executor
            .cache
            .clone()
            .map(|c| Arc::new(ResultCache::new(c)));
        Self {
            store,
            config,
            cache,
        }
    }

    /// Creates a service using a cache shared with other services.
    pub fn with_shared_cache(store: &'a S, config: MetricsConfig, cache: Arc<ResultCache>) -> Self {
        Self {
            store,
            config,
            cache: Some(cache),
        }
    }

    /// Returns the result cache if enabled.
    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    fn evaluator(&self) -> FormulaEvaluator<'a> {
        let config = ExecutorConfig {
            cache: None,
            ..self.config.executor.clone()
        };
        let evaluator = FormulaEvaluator::with_config(self.store, self.store, config);
        match &self.cache {
            Some(cache) => evaluator.with_cache(Arc::clone(cache)),
            None => evaluator,
        }
    }

    // ------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------

    /// Value of one cell; evaluation failures are logged and give `None`.
    pub fn evaluate(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> CellValue {
        self.evaluator().evaluate_cell(code, entity, survey)
    }

    /// Value of one cell, reporting evaluation failures.
    pub fn try_evaluate(
        &self,
        code: &str,
        entity: &EntityRef,
        survey: SurveyId,
    ) -> MetricsResult<CellValue> {
        Ok(self.evaluator().evaluate(code, entity, survey)?)
    }

    /// Recomputes one cell after dropping every cached cell of `code` and
    /// of the operations it reads.
    pub fn evaluate_fresh(
        &self,
        code: &str,
        entity: &EntityRef,
        survey: SurveyId,
    ) -> MetricsResult<CellValue> {
        let report = self.invalidate(self.operations_read_by(code));
        debug!(code, %report, "fresh evaluation requested");
        self.try_evaluate(code, entity, survey)
    }

    /// Values of one code for one entity across several years.
    ///
    /// Years without a survey, or whose survey does not collect `code`, map
    /// to `None`.
    pub fn evaluate_series<I>(
        &self,
        code: &str,
        entity: &EntityRef,
        years: I,
    ) -> BTreeMap<i32, CellValue>
    where
        I: IntoIterator<Item = i32>,
    {
        let evaluator = self.evaluator();
        years
            .into_iter()
            .map(|year| {
                let value = match self.store.survey_for_year(year) {
                    Some(survey) if self.store.is_active(code, survey) => {
                        evaluator.evaluate_cell(code, entity, survey)
                    }
                    _ => None,
                };
                (year, value)
            })
            .collect()
    }

    /// Values of one code for many entities; failed cells are `None`.
    pub fn evaluate_batch(
        &self,
        code: &str,
        entities: &[EntityRef],
        survey: SurveyId,
    ) -> Vec<(EntityRef, CellValue)> {
        self.evaluator().evaluate_batch(code, entities, survey)
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    /// Completion percentage of one entity.
    pub fn progress(&self, entity: &EntityRef, survey: SurveyId, role: ViewerRole) -> u8 {
        ProgressAggregator::new(self.store).for_entity(entity, survey, role)
    }

    /// Completion percentage of many entities of one kind.
    pub fn progress_batch(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        survey: SurveyId,
        role: ViewerRole,
    ) -> HashMap<EntityId, u8> {
        ProgressAggregator::new(self.store).for_entities(kind, ids, survey, role)
    }

    /// Completion percentage of an entity and everything it owns.
    pub fn total_progress(&self, entity: &EntityRef, survey: SurveyId, role: ViewerRole) -> u8 {
        self.totals().for_entity_total(entity, survey, role)
    }

    /// Mean total progress across all active establishments.
    pub fn global_progress(&self, survey: SurveyId, role: ViewerRole) -> u8 {
        self.totals().global_progress(survey, role)
    }

    fn totals(&self) -> TotalProgressAggregator<'a> {
        TotalProgressAggregator::new(self.store, self.store).with_mode(self.config.total_progress)
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------
    //
    // Each write rebuilds the dependency graph from the catalog, which
    // parses every operation formula. Use `upsert_values` to pay that once
    // for a whole form.

    /// Validates and stores the formula of an operation, then drops the
    /// cached cells of the operation and of everything depending on it.
    ///
    /// Nothing is stored when validation fails. The canonical form of the
    /// formula is what gets stored.
    pub fn save_formula(&self, code: &str, text: &str) -> MetricsResult<InvalidationReport> {
        let formula = FormulaValidator::new(self.store).check(code, text)?;
        let canonical = formula.to_string();
        self.store
            .save_formula(code, &canonical)
            .map_err(MetricsError::Store)?;
        info!(code, formula = %canonical, "saved operation formula");

        let mut stale = self.dependents_of(code);
        stale.insert(code.to_string());
        Ok(self.invalidate(stale))
    }

    /// Stores one answer, then drops the cached cells of every operation
    /// depending on `code`.
    pub fn upsert_value(
        &self,
        code: &str,
        entity: &EntityRef,
        survey: SurveyId,
        value: &str,
    ) -> MetricsResult<InvalidationReport> {
        self.ensure_stored_kind(code)?;
        self.store
            .upsert_value(code, entity, survey, value)
            .map_err(MetricsError::Store)?;
        info!(code, %entity, survey, "stored value");
        Ok(self.invalidate(self.dependents_of(code)))
    }

    /// Stores several answers of one entity, then drops the cached cells of
    /// every operation depending on any of them.
    ///
    /// Codes are checked before anything is written. If the store fails
    /// part way, the answers already written are still invalidated before
    /// the error is returned.
    pub fn upsert_values(
        &self,
        entity: &EntityRef,
        survey: SurveyId,
        values: &[(&str, &str)],
    ) -> MetricsResult<InvalidationReport> {
        for (code, _) in values {
            self.ensure_stored_kind(code)?;
        }

        let graph = DependencyGraph::build(self.store);
        let mut stale = BTreeSet::new();
        let mut written = 0;
        let mut failure = None;
        for (code, value) in values {
            if let Err(err) = self.store.upsert_value(code, entity, survey, value) {
                failure = Some(MetricsError::Store(err));
                break;
            }
            stale.extend(graph.dependents_of(code));
            written += 1;
        }
        info!(%entity, survey, written, "stored values");

        let report = self.invalidate(stale);
        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Deletes one answer, then drops the cached cells of every operation
    /// depending on `code`.
    pub fn delete_value(
        &self,
        code: &str,
        entity: &EntityRef,
        survey: SurveyId,
    ) -> MetricsResult<InvalidationReport> {
        self.ensure_stored_kind(code)?;
        self.store
            .delete_value(code, entity, survey)
            .map_err(MetricsError::Store)?;
        info!(code, %entity, survey, "deleted value");
        Ok(self.invalidate(self.dependents_of(code)))
    }

    /// Fails with [`MetricsError::CodeInUse`] when any operation references
    /// `code`; call before renaming or deleting a data type.
    pub fn ensure_code_unreferenced(&self, code: &str) -> MetricsResult<()> {
        let graph = DependencyGraph::build(self.store);
        let referenced_by: Vec<String> = graph
            .referencing(code)
            .into_iter()
            .map(str::to_string)
            .collect();

        if referenced_by.is_empty() {
            Ok(())
        } else {
            Err(MetricsError::CodeInUse {
                code: code.to_string(),
                referenced_by,
            })
        }
    }

    fn ensure_stored_kind(&self, code: &str) -> MetricsResult<()> {
        match self.store.data_type(code) {
            None => Err(EvalError::UnknownCode(code.to_string()).into()),
            Some(info) if info.kind == DataTypeKind::Operation => {
                Err(MetricsError::ReadOnlyCode(code.to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    fn dependents_of(&self, code: &str) -> BTreeSet<String> {
        DependencyGraph::build(self.store).dependents_of(code)
    }

    /// `code` itself plus every operation its formula reaches.
    fn operations_read_by(&self, code: &str) -> BTreeSet<String> {
        let reachable = self
            .store
            .data_type(code)
            .and_then(|info| info.formula)
            .and_then(|text| survey_formula::parse(&text).ok())
            .and_then(|formula| {
                FormulaValidator::new(self.store)
                    .reachable_operations(&formula)
                    .ok()
            });

        let mut codes = BTreeSet::from([code.to_string()]);
        codes.extend(reachable.into_iter().flatten());
        codes
    }

    fn invalidate(&self, codes: BTreeSet<String>) -> InvalidationReport {
        let cells_removed = self
            .cache
            .as_ref()
            .map_or(0, |cache| cache.invalidate_all(&codes));
        debug!(codes = codes.len(), cells_removed, "write invalidated cached cells");
        InvalidationReport {
            codes,
            cells_removed,
        }
    }
}
