//! Formula evaluator implementation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use survey_formula::{Aggregate, BinaryOperator, Formula};
use tracing::{debug, error, warn};

use crate::cache::{CellValue, ResultCache};
use crate::config::{ExecutorConfig, MissingValuePolicy};
use crate::entity::{EntityRef, SurveyId};
use crate::error::{EvalError, EvalResult};
use crate::traits::{DataTypeCatalog, DataTypeInfo, ValueResolver};

/// Main formula evaluation engine.
///
/// The evaluator walks operation formulas against any store implementing
/// [`DataTypeCatalog`] and [`ValueResolver`] and produces one numeric cell
/// per (code, entity, survey).
///
/// # Example
///
/// ```ignore
/// use survey_formula_executor::{EntityRef, FormulaEvaluator};
///
/// // Assumes `store` implements DataTypeCatalog + ValueResolver
/// let evaluator = FormulaEvaluator::new(&store, &store);
///
/// let value = evaluator.evaluate("Z", &EntityRef::establishment(1), 2024)?;
/// println!("Z = {:?}", value);
/// ```
pub struct FormulaEvaluator<'a> {
    catalog: &'a dyn DataTypeCatalog,
    resolver: &'a dyn ValueResolver,
    config: ExecutorConfig,
    cache: Option<Arc<ResultCache>>,
}

/// State of one top-level evaluation.
///
/// The entity and survey are fixed for the whole call, so memoized cells are
/// keyed by code alone.
struct Scope<'e> {
    entity: &'e EntityRef,
    survey: SurveyId,
    values: HashMap<String, CellValue>,
    visiting: HashSet<String>,
}

impl<'e> Scope<'e> {
    fn new(entity: &'e EntityRef, survey: SurveyId) -> Self {
        Self {
            entity,
            survey,
            values: HashMap::new(),
            visiting: HashSet::new(),
        }
    }
}

impl<'a> FormulaEvaluator<'a> {
    /// Creates a new evaluator with default configuration (no cache).
    pub fn new(catalog: &'a dyn DataTypeCatalog, resolver: &'a dyn ValueResolver) -> Self {
        Self::with_config(catalog, resolver, ExecutorConfig::default())
    }

    /// Creates an evaluator with custom configuration.
    ///
    /// A cache is created when `config.cache` is set; use
    /// [`with_cache`](Self::with_cache) to share one across evaluators.
    pub fn with_config(
        catalog: &'a dyn DataTypeCatalog,
        resolver: &'a dyn ValueResolver,
        config: ExecutorConfig,
    ) -> Self {
        let cache = config
            .cache
            .as_ref()
            .map(|c| Arc::new(ResultCache::new(c.clone())));
        Self {
            catalog,
            resolver,
            config,
            cache,
        }
    }

    /// Uses a shared cache instead of the configured one.
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns a reference to the cache if enabled.
    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_deref()
    }

    /// Returns a reference to the executor configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Evaluates one data type for one entity and survey.
    ///
    /// For an operation the formula is evaluated (consulting and filling the
    /// cache if enabled); for a leaf the stored answer is read and coerced
    /// to a number.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` - The computed number
    /// * `Ok(None)` - Null (no answer, or a null propagated through the formula)
    /// * `Err(EvalError)` - The cell could not be evaluated
    pub fn evaluate(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> EvalResult<CellValue> {
        let mut scope = Scope::new(entity, survey);
        let info = self.data_type(code)?;
        if info.kind.is_leaf() {
            self.leaf_value(code, &mut scope)
        } else {
            self.operation_value(&info, &mut scope)
        }
    }

    /// Evaluates an ad hoc formula that does not belong to any operation.
    ///
    /// Every identifier must exist in the catalog. The result is not cached.
    pub fn evaluate_formula(
        &self,
        text: &str,
        entity: &EntityRef,
        survey: SurveyId,
    ) -> EvalResult<CellValue> {
        let formula = survey_formula::parse_with_codes(text, |code| self.catalog.contains(code))?;
        let mut scope = Scope::new(entity, survey);
        self.evaluate_node(text, &formula, &mut scope)
    }

    /// Evaluates one cell, collapsing any error to null.
    ///
    /// Errors are logged: incomplete answers at `warn`, registry problems
    /// at `error`.
    pub fn evaluate_cell(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> CellValue {
        match self.evaluate(code, entity, survey) {
            Ok(value) => value,
            Err(err) if err.is_cell_error() => {
                warn!(code, %entity, survey, error = %err, "cell evaluation failed, left empty");
                None
            }
            Err(err) => {
                error!(code, %entity, survey, error = %err, "cell evaluation failed, left empty");
                None
            }
        }
    }

    /// Evaluates one code for many entities.
    ///
    /// A failing cell never aborts its siblings; it is reported as null.
    /// With the `parallel` feature and `config.parallel`, cells are
    /// evaluated on the rayon pool.
    pub fn evaluate_batch(
        &self,
        code: &str,
        entities: &[EntityRef],
        survey: SurveyId,
    ) -> Vec<(EntityRef, CellValue)> {
        #[cfg(feature = "parallel")]
        {
            if self.config.parallel {
                use rayon::prelude::*;
                return entities
                    .par_iter()
                    .map(|entity| (*entity, self.evaluate_cell(code, entity, survey)))
                    .collect();
            }
        }

        entities
            .iter()
            .map(|entity| (*entity, self.evaluate_cell(code, entity, survey)))
            .collect()
    }

    fn data_type(&self, code: &str) -> EvalResult<DataTypeInfo> {
        self.catalog
            .data_type(code)
            .ok_or_else(|| EvalError::UnknownCode(code.to_string()))
    }

    /// Reads and coerces a stored answer; memoized per scope.
    fn leaf_value(&self, code: &str, scope: &mut Scope<'_>) -> EvalResult<CellValue> {
        if let Some(value) = scope.values.get(code) {
            return Ok(*value);
        }
        let raw = self.resolver.resolve(code, scope.entity, scope.survey);
        let value = coerce(code, raw.as_deref())?;
        scope.values.insert(code.to_string(), value);
        Ok(value)
    }

    /// Evaluates an operation; memoized per scope and, if enabled, cached.
    fn operation_value(&self, info: &DataTypeInfo, scope: &mut Scope<'_>) -> EvalResult<CellValue> {
        let code = info.code.as_str();
        if let Some(value) = scope.values.get(code) {
            return Ok(*value);
        }

        // Read before any answer so a concurrent invalidation is noticed
        let generation = self.cache.as_ref().map(|cache| cache.generation(code));
        if let Some(cache) = &self.cache {
            if let Some(value) = cache.get(code, scope.entity, scope.survey) {
                debug!(code, entity = %scope.entity, survey = scope.survey, "cache hit");
                scope.values.insert(code.to_string(), value);
                return Ok(value);
            }
        }

        if !scope.visiting.insert(code.to_string()) {
            return Err(EvalError::CycleDetected(code.to_string()));
        }
        let result = self
            .operation_formula(info)
            .and_then(|formula| self.evaluate_node(code, &formula, scope));
        scope.visiting.remove(code);
        let value = result?;

        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            cache.put_if_current(code, scope.entity, scope.survey, value, generation);
        }
        scope.values.insert(code.to_string(), value);
        Ok(value)
    }

    fn operation_formula(&self, info: &DataTypeInfo) -> EvalResult<Formula> {
        let text = info
            .formula
            .as_deref()
            .ok_or_else(|| EvalError::MissingFormula(info.code.clone()))?;
        Ok(survey_formula::parse(text)?)
    }

    /// Value of an identifier inside a formula, with the missing-value
    /// policy applied to absent leaf answers.
    fn identifier(&self, code: &str, scope: &mut Scope<'_>) -> EvalResult<CellValue> {
        let info = self.data_type(code)?;
        if !info.kind.is_leaf() {
            return self.operation_value(&info, scope);
        }

        match (self.leaf_value(code, scope)?, self.config.missing_values) {
            (Some(value), _) => Ok(Some(value)),
            (None, MissingValuePolicy::Propagate) => Ok(None),
            (None, MissingValuePolicy::Zero) => Ok(Some(0.0)),
            (None, MissingValuePolicy::Fail) => Err(EvalError::MissingValue {
                code: code.to_string(),
            }),
        }
    }

    /// `owner` names the operation being evaluated, for error reporting.
    fn evaluate_node(&self, owner: &str, node: &Formula, scope: &mut Scope<'_>) -> EvalResult<CellValue> {
        match node {
            Formula::Literal(value) => Ok(Some(*value)),
            Formula::Identifier(code) => self.identifier(code, scope),
            Formula::BinaryOp { op, left, right } => {
                let left = self.evaluate_node(owner, left, scope)?;
                let right = self.evaluate_node(owner, right, scope)?;
                match (left, right) {
                    (Some(left), Some(right)) => apply(owner, *op, left, right).map(Some),
                    _ => Ok(None),
                }
            }
            Formula::FuncCall { function, args } => {
                let values = args
                    .iter()
                    .map(|code| self.identifier(code, scope))
                    .collect::<EvalResult<Vec<CellValue>>>()?;
                match values.into_iter().collect::<Option<Vec<f64>>>() {
                    Some(values) => aggregate(owner, *function, &values).map(Some),
                    None => Ok(None),
                }
            }
        }
    }
}

fn apply(owner: &str, op: BinaryOperator, left: f64, right: f64) -> EvalResult<f64> {
    let value = match op {
        BinaryOperator::Add => left + right,
        BinaryOperator::Subtract => left - right,
        BinaryOperator::Multiply => left * right,
        BinaryOperator::Divide if right == 0.0 => {
            return Err(EvalError::DivisionByZero {
                code: owner.to_string(),
            })
        }
        BinaryOperator::Divide => left / right,
    };
    finite(owner, value)
}

fn aggregate(owner: &str, function: Aggregate, values: &[f64]) -> EvalResult<f64> {
    let sum = finite(owner, values.iter().sum())?;
    match function {
        Aggregate::Sum => Ok(sum),
        // The grammar forbids empty lists; a hand-built tree may not.
        Aggregate::Avg if values.is_empty() => Err(EvalError::DivisionByZero {
            code: owner.to_string(),
        }),
        Aggregate::Avg => Ok(sum / values.len() as f64),
    }
}

fn finite(owner: &str, value: f64) -> EvalResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::Overflow {
            code: owner.to_string(),
        })
    }
}

/// Coerces a stored answer to a number.
///
/// Blank answers count as absent. A decimal comma is accepted.
fn coerce(code: &str, raw: Option<&str>) -> EvalResult<CellValue> {
    let text = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(text) => text,
    };

    match text.replace(',', ".").parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(EvalError::NotNumeric {
            code: code.to_string(),
            value: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::traits::DataTypeKind;
    use parking_lot::Mutex;

    /// In-memory store counting how often each answer is read.
    struct MockStore {
        types: HashMap<String, DataTypeInfo>,
        values: HashMap<(String, EntityRef, SurveyId), String>,
        reads: Mutex<HashMap<String, usize>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                types: HashMap::new(),
                values: HashMap::new(),
                reads: Mutex::new(HashMap::new()),
            }
        }

        fn with_type(mut self, info: DataTypeInfo) -> Self {
            self.types.insert(info.code.clone(), info);
            self
        }

        fn with_value(mut self, code: &str, entity: EntityRef, value: &str) -> Self {
            self.values
                .insert((code.to_string(), entity, SURVEY), value.to_string());
            self
        }

        fn reads_of(&self, code: &str) -> usize {
            self.reads.lock().get(code).copied().unwrap_or(0)
        }
    }

    impl DataTypeCatalog for MockStore {
        fn data_type(&self, code: &str) -> Option<DataTypeInfo> {
            self.types.get(code).cloned()
        }

        fn operation_codes(&self) -> Vec<String> {
            self.types
                .values()
                .filter(|t| !t.kind.is_leaf())
                .map(|t| t.code.clone())
                .collect()
        }
    }

    impl ValueResolver for MockStore {
        fn resolve(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> Option<String> {
            *self.reads.lock().entry(code.to_string()).or_default() += 1;
            self.values.get(&(code.to_string(), *entity, survey)).cloned()
        }
    }

    const SURVEY: SurveyId = 2024;

    fn e1() -> EntityRef {
        EntityRef::establishment(1)
    }

    fn base_store() -> MockStore {
        MockStore::new()
            .with_type(DataTypeInfo::number("X"))
            .with_type(DataTypeInfo::number("Y"))
            .with_type(DataTypeInfo::number("W"))
            .with_type(DataTypeInfo::operation("Z", "(X+Y)/2"))
            .with_value("X", e1(), "10")
            .with_value("Y", e1(), "20")
    }

    // Leaf values

    #[test]
    fn test_leaf_value() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(evaluator.evaluate("X", &e1(), SURVEY).unwrap(), Some(10.0));
    }

    #[test]
    fn test_absent_leaf_is_null() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(evaluator.evaluate("W", &e1(), SURVEY).unwrap(), None);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("X", Some(" 12.5 ")).unwrap(), Some(12.5));
        assert_eq!(coerce("X", Some("3,25")).unwrap(), Some(3.25));
        assert_eq!(coerce("X", Some("   ")).unwrap(), None);
        assert_eq!(coerce("X", None).unwrap(), None);
        assert!(matches!(coerce("X", Some("n/a")), Err(EvalError::NotNumeric { .. })));
        assert!(matches!(coerce("X", Some("inf")), Err(EvalError::NotNumeric { .. })));
    }

    // Operations

    #[test]
    fn test_operation_mean() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(evaluator.evaluate("Z", &e1(), SURVEY).unwrap(), Some(15.0));
    }

    #[test]
    fn test_nested_operation() {
        let store = base_store().with_type(DataTypeInfo::operation("Pct", "Z*100/Y"));
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(evaluator.evaluate("Pct", &e1(), SURVEY).unwrap(), Some(75.0));
    }

    #[test]
    fn test_sum_and_avg() {
        let store = base_store()
            .with_value("W", e1(), "30")
            .with_type(DataTypeInfo::operation("S", "sum(X,Y,W)"))
            .with_type(DataTypeInfo::operation("M", "avg(X,Y)"));
        let evaluator = FormulaEvaluator::new(&store, &store);

        assert_eq!(evaluator.evaluate("S", &e1(), SURVEY).unwrap(), Some(60.0));
        assert_eq!(evaluator.evaluate("M", &e1(), SURVEY).unwrap(), Some(15.0));
    }

    #[test]
    fn test_shared_subexpression_read_once() {
        let store = base_store().with_type(DataTypeInfo::operation("Twice", "Z+Z*2+sum(X,X)"));
        let evaluator = FormulaEvaluator::new(&store, &store);

        assert_eq!(evaluator.evaluate("Twice", &e1(), SURVEY).unwrap(), Some(65.0));
        assert_eq!(store.reads_of("X"), 1);
        assert_eq!(store.reads_of("Y"), 1);
    }

    #[test]
    fn test_evaluate_formula_ad_hoc() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(
            evaluator.evaluate_formula("sum(X,Y)-Z", &e1(), SURVEY).unwrap(),
            Some(15.0)
        );
    }

    #[test]
    fn test_evaluate_formula_unknown_code() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert!(matches!(
            evaluator.evaluate_formula("X+Nope", &e1(), SURVEY),
            Err(EvalError::Formula(_))
        ));
    }

    // Missing values

    #[test]
    fn test_missing_value_propagates_by_default() {
        let store = base_store().with_type(DataTypeInfo::operation("T", "X+W"));
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(evaluator.evaluate("T", &e1(), SURVEY).unwrap(), None);
    }

    #[test]
    fn test_missing_value_in_function_propagates() {
        let store = base_store().with_type(DataTypeInfo::operation("T", "sum(X,W)"));
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(evaluator.evaluate("T", &e1(), SURVEY).unwrap(), None);
    }

    #[test]
    fn test_missing_value_as_zero() {
        let store = base_store().with_type(DataTypeInfo::operation("T", "avg(X,W)"));
        let config = ExecutorConfig::builder()
            .with_missing_values(MissingValuePolicy::Zero)
            .build();
        let evaluator = FormulaEvaluator::with_config(&store, &store, config);
        assert_eq!(evaluator.evaluate("T", &e1(), SURVEY).unwrap(), Some(5.0));
    }

    #[test]
    fn test_missing_value_fails_cell() {
        let store = base_store().with_type(DataTypeInfo::operation("T", "X+W"));
        let config = ExecutorConfig::builder()
            .with_missing_values(MissingValuePolicy::Fail)
            .build();
        let evaluator = FormulaEvaluator::with_config(&store, &store, config);
        assert_eq!(
            evaluator.evaluate("T", &e1(), SURVEY),
            Err(EvalError::MissingValue {
                code: "W".to_string()
            })
        );
    }

    // Errors

    #[test]
    fn test_division_by_zero() {
        let store = base_store()
            .with_value("W", e1(), "0")
            .with_type(DataTypeInfo::operation("R", "X/W"));
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(
            evaluator.evaluate("R", &e1(), SURVEY),
            Err(EvalError::DivisionByZero {
                code: "R".to_string()
            })
        );
        assert_eq!(evaluator.evaluate_cell("R", &e1(), SURVEY), None);
    }

    #[test]
    fn test_overflow_is_cell_error() {
        let store = base_store()
            .with_value("X", e1(), "1e200")
            .with_value("Y", e1(), "1e200")
            .with_type(DataTypeInfo::operation("Big", "X*Y"))
            .with_type(DataTypeInfo::operation("Huge", "sum(X,Y)*X"));
        let evaluator = FormulaEvaluator::new(&store, &store)
            .with_cache(Arc::new(ResultCache::with_capacity(10)));

        assert_eq!(
            evaluator.evaluate("Big", &e1(), SURVEY),
            Err(EvalError::Overflow {
                code: "Big".to_string()
            })
        );
        assert!(matches!(
            evaluator.evaluate("Huge", &e1(), SURVEY),
            Err(EvalError::Overflow { .. })
        ));
        assert_eq!(evaluator.evaluate_cell("Big", &e1(), SURVEY), None);
        assert!(evaluator.cache().unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_overflow() {
        assert!(matches!(
            aggregate("S", Aggregate::Sum, &[f64::MAX, f64::MAX]),
            Err(EvalError::Overflow { .. })
        ));
        assert_eq!(aggregate("S", Aggregate::Avg, &[1.0, 2.0]).unwrap(), 1.5);
    }

    #[test]
    fn test_non_numeric_text_answer() {
        let store = base_store()
            .with_type(DataTypeInfo::leaf("Note", DataTypeKind::Text))
            .with_value("Note", e1(), "closed in summer")
            .with_type(DataTypeInfo::operation("T", "Note+1"));
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert!(matches!(
            evaluator.evaluate("T", &e1(), SURVEY),
            Err(EvalError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_unknown_code() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(
            evaluator.evaluate("Nope", &e1(), SURVEY),
            Err(EvalError::UnknownCode("Nope".to_string()))
        );
    }

    #[test]
    fn test_cycle_guard() {
        // Written behind the validator's back
        let store = base_store()
            .with_type(DataTypeInfo::operation("P", "Q+1"))
            .with_type(DataTypeInfo::operation("Q", "P*2"));
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(
            evaluator.evaluate("P", &e1(), SURVEY),
            Err(EvalError::CycleDetected("P".to_string()))
        );
    }

    #[test]
    fn test_operation_without_formula() {
        let store = base_store().with_type(DataTypeInfo {
            code: "Empty".to_string(),
            kind: DataTypeKind::Operation,
            formula: None,
        });
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert_eq!(
            evaluator.evaluate("Empty", &e1(), SURVEY),
            Err(EvalError::MissingFormula("Empty".to_string()))
        );
    }

    // Batches

    #[test]
    fn test_batch_survives_failed_cell() {
        let e2 = EntityRef::establishment(2);
        let e3 = EntityRef::establishment(3);
        let store = base_store()
            .with_type(DataTypeInfo::operation("R", "X/Y"))
            .with_value("X", e2, "5")
            .with_value("Y", e2, "0")
            .with_value("X", e3, "9")
            .with_value("Y", e3, "3");
        let evaluator = FormulaEvaluator::new(&store, &store);

        let results = evaluator.evaluate_batch("R", &[e1(), e2, e3], SURVEY);
        assert_eq!(results, vec![(e1(), Some(0.5)), (e2, None), (e3, Some(3.0))]);
    }

    // Caching

    #[test]
    fn test_cache_filled_and_reused() {
        let store = base_store();
        let config = ExecutorConfig::builder()
            .with_cache(CacheConfig::default())
            .build();
        let evaluator = FormulaEvaluator::with_config(&store, &store, config);

        assert_eq!(evaluator.evaluate("Z", &e1(), SURVEY).unwrap(), Some(15.0));
        assert_eq!(evaluator.evaluate("Z", &e1(), SURVEY).unwrap(), Some(15.0));

        let cache = evaluator.cache().expect("cache enabled");
        assert!(cache.contains("Z", &e1(), SURVEY));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(store.reads_of("X"), 1);
    }

    #[test]
    fn test_leaves_are_not_cached() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store)
            .with_cache(Arc::new(ResultCache::with_capacity(10)));

        evaluator.evaluate("X", &e1(), SURVEY).unwrap();
        assert!(evaluator.cache().unwrap().is_empty());
    }

    #[test]
    fn test_errors_are_not_cached() {
        let store = base_store()
            .with_value("W", e1(), "0")
            .with_type(DataTypeInfo::operation("R", "X/W"));
        let evaluator = FormulaEvaluator::new(&store, &store)
            .with_cache(Arc::new(ResultCache::with_capacity(10)));

        assert!(evaluator.evaluate("R", &e1(), SURVEY).is_err());
        assert!(evaluator.cache().unwrap().is_empty());
    }

    /// Resolver that overwrites X and invalidates Z right after handing out
    /// the old answer, as a concurrent writer would.
    struct WriteDuringRead {
        base: MockStore,
        cache: Arc<ResultCache>,
        new_x: Mutex<Option<String>>,
    }

    impl DataTypeCatalog for WriteDuringRead {
        fn data_type(&self, code: &str) -> Option<DataTypeInfo> {
            self.base.data_type(code)
        }

        fn operation_codes(&self) -> Vec<String> {
            self.base.operation_codes()
        }
    }

    impl ValueResolver for WriteDuringRead {
        fn resolve(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> Option<String> {
            if code != "X" {
                return self.base.resolve(code, entity, survey);
            }
            let mut new_x = self.new_x.lock();
            if let Some(value) = new_x.as_ref() {
                return Some(value.clone());
            }
            let old = self.base.resolve(code, entity, survey);
            *new_x = Some("30".to_string());
            drop(new_x);
            self.cache.invalidate("Z");
            old
        }
    }

    #[test]
    fn test_cell_computed_across_invalidation_is_not_cached() {
        let cache = Arc::new(ResultCache::with_capacity(10));
        let store = WriteDuringRead {
            base: base_store(),
            cache: Arc::clone(&cache),
            new_x: Mutex::new(None),
        };
        let evaluator = FormulaEvaluator::new(&store, &store).with_cache(Arc::clone(&cache));

        // The in-flight read may see the old answer...
        assert_eq!(evaluator.evaluate("Z", &e1(), SURVEY).unwrap(), Some(15.0));
        assert!(!cache.contains("Z", &e1(), SURVEY));

        // ...but the next read computes from the new one and caches it
        assert_eq!(evaluator.evaluate("Z", &e1(), SURVEY).unwrap(), Some(25.0));
        assert_eq!(cache.get("Z", &e1(), SURVEY), Some(Some(25.0)));
    }

    #[test]
    fn test_no_cache_by_default() {
        let store = base_store();
        let evaluator = FormulaEvaluator::new(&store, &store);
        assert!(evaluator.cache().is_none());
    }
}
