//! Dependency graph between operations and the codes they reference.
//!
//! Built once from the catalog, the graph answers "what does this operation
//! read" and, more importantly for cache invalidation, "which operations
//! must be recomputed when this code changes".

use std::collections::{BTreeSet, HashMap, VecDeque};

use survey_formula::Formula;
use tracing::warn;

use crate::traits::DataTypeCatalog;

/// Forward and reverse dependency index over all operations.
///
/// # Example
///
/// ```rust
/// use survey_formula::parse;
/// use survey_formula_executor::DependencyGraph;
///
/// let graph = DependencyGraph::from_formulas([
///     ("Z".to_string(), parse("(X+Y)/2").unwrap()),
///     ("W".to_string(), parse("Z*100").unwrap()),
/// ]);
///
/// let dependents: Vec<String> = graph.dependents_of("X").into_iter().collect();
/// assert_eq!(dependents, vec!["W".to_string(), "Z".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Operation code -> codes its formula references.
    dependencies: HashMap<String, BTreeSet<String>>,
    /// Code -> operations whose formula references it.
    dependents: HashMap<String, BTreeSet<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Builds the graph from every operation in the catalog.
    ///
    /// Operations whose stored formula does not parse are left out with a
    /// warning; they cannot be evaluated, so nothing depending on them is
    /// ever cached.
    pub fn build(catalog: &dyn DataTypeCatalog) -> Self {
        let formulas = catalog.operation_codes().into_iter().filter_map(|code| {
            let text = catalog.data_type(&code)?.formula?;
            match survey_formula::parse(&text) {
                Ok(formula) => Some((code, formula)),
                Err(err) => {
                    warn!(code = %code, error = %err, "stored formula does not parse, skipped");
                    None
                }
            }
        });
        Self::from_formulas(formulas)
    }

    /// Builds the graph from already parsed formulas.
    pub fn from_formulas<I>(formulas: I) -> Self
    where
        I: IntoIterator<Item = (String, Formula)>,
    {
        let mut graph = Self::default();
        for (code, formula) in formulas {
            graph.insert(code, &formula);
        }
        graph
    }

    /// Adds or replaces the formula of one operation.
    pub fn insert(&mut self, code: String, formula: &Formula) {
        self.remove(&code);

        let references: BTreeSet<String> =
            formula.references().into_iter().map(str::to_string).collect();
        for reference in &references {
            self.dependents
                .entry(reference.clone())
                .or_default()
                .insert(code.clone());
        }
        self.dependencies.insert(code, references);
    }

    /// Removes an operation's outgoing edges.
    pub fn remove(&mut self, code: &str) {
        if let Some(previous) = self.dependencies.remove(code) {
            for reference in previous {
                if let Some(set) = self.dependents.get_mut(&reference) {
                    set.remove(code);
                    if set.is_empty() {
                        self.dependents.remove(&reference);
                    }
                }
            }
        }
    }

    /// Number of operations in the graph.
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Returns true if the graph holds no operation.
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Codes directly referenced by an operation.
    pub fn dependencies_of(&self, code: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(code)
    }

    /// Operations whose formula references `code` directly.
    pub fn referencing(&self, code: &str) -> Vec<&str> {
        self.dependents
            .get(code)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Operations that depend on `code` directly or transitively.
    ///
    /// Does NOT include `code` itself unless it sits on a cycle.
    pub fn dependents_of(&self, code: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(code);

        while let Some(current) = queue.pop_front() {
            if let Some(direct) = self.dependents.get(current) {
                for dependent in direct {
                    if visited.insert(dependent.clone()) {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        visited
    }

    /// Finds a dependency cycle anywhere in the graph.
    ///
    /// Returns the cycle as a path that starts and ends with the same code,
    /// or `None` when the graph is acyclic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut roots: Vec<&str> = self.dependencies.keys().map(String::as_str).collect();
        roots.sort_unstable();

        for root in roots {
            let mut path = Vec::new();
            if let Some(cycle) = self.visit(root, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'g>(
        &'g self,
        code: &'g str,
        marks: &mut HashMap<&'g str, Mark>,
        path: &mut Vec<&'g str>,
    ) -> Option<Vec<String>> {
        match marks.get(code) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|c| *c == code).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|c| c.to_string()).collect();
                cycle.push(code.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(code, Mark::Visiting);
        path.push(code);
        if let Some(references) = self.dependencies.get(code) {
            for reference in references {
                if let Some(cycle) = self.visit(reference, marks, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        marks.insert(code, Mark::Done);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_formula::parse;

    fn graph(entries: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph::from_formulas(
            entries
                .iter()
                .map(|(code, text)| (code.to_string(), parse(text).unwrap())),
        )
    }

    #[test]
    fn test_dependencies_of() {
        let g = graph(&[("Z", "(X+Y)/2")]);
        let deps: Vec<&str> = g
            .dependencies_of("Z")
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(deps, vec!["X", "Y"]);
        assert!(g.dependencies_of("X").is_none());
    }

    #[test]
    fn test_referencing_is_direct_only() {
        let g = graph(&[("Z", "X+1"), ("W", "Z*2")]);
        assert_eq!(g.referencing("X"), vec!["Z"]);
        assert_eq!(g.referencing("Z"), vec!["W"]);
        assert!(g.referencing("W").is_empty());
    }

    #[test]
    fn test_dependents_are_transitive() {
        let g = graph(&[("A", "X+1"), ("B", "A*2"), ("C", "sum(B,Y)"), ("D", "Y")]);
        let dependents: Vec<String> = g.dependents_of("X").into_iter().collect();
        assert_eq!(dependents, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_diamond_dependents_listed_once() {
        let g = graph(&[("L", "X"), ("R", "X*2"), ("Top", "L+R")]);
        assert_eq!(g.dependents_of("X").len(), 3);
    }

    #[test]
    fn test_insert_replaces_edges() {
        let mut g = graph(&[("Z", "X+Y")]);
        g.insert("Z".to_string(), &parse("Y*2").unwrap());

        assert!(g.referencing("X").is_empty());
        assert_eq!(g.referencing("Y"), vec!["Z"]);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut g = graph(&[("Z", "X+Y")]);
        g.remove("Z");
        assert!(g.is_empty());
        assert!(g.dependents_of("X").is_empty());
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let g = graph(&[("A", "X+1"), ("B", "A*2"), ("C", "A+B")]);
        assert_eq!(g.find_cycle(), None);
    }

    #[test]
    fn test_find_direct_cycle() {
        let g = graph(&[("X", "Y+1"), ("Y", "X*2")]);
        let cycle = g.find_cycle().expect("cycle expected");
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_find_transitive_cycle() {
        let g = graph(&[("A", "B"), ("B", "C"), ("C", "sum(A,X)")]);
        let cycle = g.find_cycle().expect("cycle expected");
        assert_eq!(cycle, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_self_reference_cycle() {
        let g = graph(&[("A", "A+1")]);
        assert_eq!(g.find_cycle(), Some(vec!["A".to_string(), "A".to_string()]));
    }
}
