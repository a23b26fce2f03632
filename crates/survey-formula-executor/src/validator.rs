//! Write-time formula validation.
//!
//! Every create or update of an operation goes through
//! [`FormulaValidator::check`] before anything is persisted, so the
//! evaluator never sees a cyclic registry written through this path.

use std::collections::{BTreeSet, HashMap};

use survey_formula::{check_charset, parse, parse_with_codes, Formula};

use crate::error::{EvalError, EvalResult};
use crate::traits::{DataTypeCatalog, DataTypeKind};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Structural and dependency validation of operation formulas.
///
/// # Example
///
/// ```ignore
/// let validator = FormulaValidator::new(&catalog);
///
/// // Parses, resolves every code and rejects cycles
/// let formula = validator.check("Z", "(X+Y)/2")?;
/// ```
pub struct FormulaValidator<'a> {
    catalog: &'a dyn DataTypeCatalog,
}

impl<'a> FormulaValidator<'a> {
    /// Creates a validator over the given catalog.
    pub fn new(catalog: &'a dyn DataTypeCatalog) -> Self {
        Self { catalog }
    }

    /// Runs the full write-path check for the formula of `owner`:
    /// boundary character check, parse against known codes, cycle check.
    pub fn check(&self, owner: &str, text: &str) -> EvalResult<Formula> {
        match self.catalog.data_type(owner) {
            Some(info) if info.kind != DataTypeKind::Operation => {
                return Err(EvalError::NotAnOperation(owner.to_string()));
            }
            _ => {}
        }

        check_charset(text)?;
        let formula = parse_with_codes(text, |code| self.catalog.contains(code))?;
        self.validate(owner, &formula)?;
        Ok(formula)
    }

    /// Rejects `formula` as the formula of `owner` if `owner` is reachable
    /// from it, directly or through any depth of nested operations.
    ///
    /// The stored formula of `owner` is ignored: `formula` replaces it.
    pub fn validate(&self, owner: &str, formula: &Formula) -> EvalResult<()> {
        let mut walk = Walk::new(Some(owner));
        for code in formula.references() {
            self.visit(code, &mut walk)?;
        }
        Ok(())
    }

    /// Operation codes transitively reachable from `formula`.
    pub fn reachable_operations(&self, formula: &Formula) -> EvalResult<BTreeSet<String>> {
        let mut walk = Walk::new(None);
        for code in formula.references() {
            self.visit(code, &mut walk)?;
        }
        Ok(walk.operations)
    }

    fn visit(&self, code: &str, walk: &mut Walk<'_>) -> EvalResult<()> {
        if walk.owner == Some(code) {
            return Err(walk.cycle_error(code));
        }
        match walk.marks.get(code) {
            Some(Mark::Done) => return Ok(()),
            // A cycle already present in the registry, not through the owner
            Some(Mark::Visiting) => return Err(walk.cycle_error(code)),
            None => {}
        }

        let info = self
            .catalog
            .data_type(code)
            .ok_or_else(|| EvalError::UnknownCode(code.to_string()))?;
        if info.kind.is_leaf() {
            walk.marks.insert(code.to_string(), Mark::Done);
            return Ok(());
        }

        let text = info
            .formula
            .ok_or_else(|| EvalError::MissingFormula(code.to_string()))?;
        let nested = parse(&text)?;

        walk.marks.insert(code.to_string(), Mark::Visiting);
        walk.path.push(code.to_string());
        for reference in nested.references() {
            self.visit(reference, walk)?;
        }
        walk.path.pop();
        walk.marks.insert(code.to_string(), Mark::Done);
        walk.operations.insert(code.to_string());
        Ok(())
    }
}

/// Depth-first walk state.
struct Walk<'o> {
    owner: Option<&'o str>,
    marks: HashMap<String, Mark>,
    /// Operations on the current DFS branch, below the owner.
    path: Vec<String>,
    operations: BTreeSet<String>,
}

impl<'o> Walk<'o> {
    fn new(owner: Option<&'o str>) -> Self {
        Self {
            owner,
            marks: HashMap::new(),
            path: Vec::new(),
            operations: BTreeSet::new(),
        }
    }

    fn cycle_error(&self, closing: &str) -> EvalError {
        let mut path: Vec<String> = Vec::with_capacity(self.path.len() + 2);
        match self.owner {
            Some(owner) if owner == closing => {
                path.push(owner.to_string());
                path.extend(self.path.iter().cloned());
            }
            _ => {
                let start = self.path.iter().position(|c| c == closing).unwrap_or(0);
                path.extend(self.path[start..].iter().cloned());
            }
        }
        path.push(closing.to_string());
        EvalError::CyclicFormula {
            code: closing.to_string(),
            path,
        }
    }
}
