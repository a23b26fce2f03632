//! Total progress over an entity's subtree.
//!
//! The subtree is collected one hierarchy level at a time: each level costs
//! one `children` lookup and one answered count per entity kind present,
//! however many entities it holds.

use std::collections::{BTreeMap, HashMap, HashSet};

use survey_formula_executor::{AdministrationEntity, EntityId, EntityKind, EntityRef, SurveyId};
use tracing::debug;

use crate::config::TotalProgressMode;
use crate::progress::ProgressAggregator;
use crate::traits::{EntityHierarchy, ProgressSource, ViewerRole};

/// Progress of entities together with everything they own.
///
/// # Example
///
/// ```ignore
/// let totals = TotalProgressAggregator::new(&store, &store);
///
/// // Establishment 1, its documentary structures and their libraries
/// let total = totals.for_establishment_total(1, 2024, ViewerRole::Contributor);
/// ```
pub struct TotalProgressAggregator<'a> {
    progress: ProgressAggregator<'a>,
    hierarchy: &'a dyn EntityHierarchy,
    mode: TotalProgressMode,
}

impl<'a> TotalProgressAggregator<'a> {
    /// Creates an aggregator using the flat composition.
    pub fn new(source: &'a dyn ProgressSource, hierarchy: &'a dyn EntityHierarchy) -> Self {
        Self {
            progress: ProgressAggregator::new(source),
            hierarchy,
            mode: TotalProgressMode::default(),
        }
    }

    /// Sets the composition mode.
    pub fn with_mode(mut self, mode: TotalProgressMode) -> Self {
        self.mode = mode;
        self
    }

    /// Total progress of an establishment.
    pub fn for_establishment_total(
        &self,
        establishment: EntityId,
        survey: SurveyId,
        role: ViewerRole,
    ) -> u8 {
        self.for_entity_total(&EntityRef::establishment(establishment), survey, role)
    }

    /// Total progress of any entity: itself plus every descendant.
    pub fn for_entity_total(&self, root: &EntityRef, survey: SurveyId, role: ViewerRole) -> u8 {
        self.for_roots(std::slice::from_ref(root), survey, role)
            .get(root)
            .copied()
            .unwrap_or(0)
    }

    /// Total progress of several entities, sharing the level-wise lookups.
    pub fn for_roots(
        &self,
        roots: &[EntityRef],
        survey: SurveyId,
        role: ViewerRole,
    ) -> HashMap<EntityRef, u8> {
        let forest = self.collect(roots, survey, role);
        roots
            .iter()
            .map(|root| {
                let total = match self.mode {
                    TotalProgressMode::Flat => forest.flat(root),
                    TotalProgressMode::Hierarchical => forest.hierarchical(root),
                };
                (*root, total)
            })
            .collect()
    }

    /// Mean total progress across every active establishment; 0 when there
    /// are none.
    pub fn global_progress(&self, survey: SurveyId, role: ViewerRole) -> u8 {
        let roots: Vec<EntityRef> = self
            .hierarchy
            .active_establishments()
            .iter()
            .map(|node| node.entity_ref())
            .collect();
        if roots.is_empty() {
            return 0;
        }

        let totals = self.for_roots(&roots, survey, role);
        let sum: f64 = totals.values().map(|total| f64::from(*total)).sum();
        round_percent(sum / totals.len() as f64)
    }

    fn collect(&self, roots: &[EntityRef], survey: SurveyId, role: ViewerRole) -> Forest {
        let mut forest = Forest::default();
        let mut seen: HashSet<EntityRef> = HashSet::new();
        let mut level: Vec<EntityRef> = roots.iter().copied().filter(|r| seen.insert(*r)).collect();
        let mut depth = 0usize;

        while !level.is_empty() {
            let mut by_kind: BTreeMap<EntityKind, Vec<EntityId>> = BTreeMap::new();
            for entity in &level {
                by_kind.entry(entity.kind).or_default().push(entity.id);
            }
            for (kind, ids) in by_kind {
                let scores = self.progress.for_entities(kind, &ids, survey, role);
                forest
                    .scores
                    .extend(scores.into_iter().map(|(id, score)| (EntityRef::new(kind, id), score)));
            }

            let parents: Vec<EntityRef> = level
                .iter()
                .copied()
                .filter(|e| e.kind.child_kind().is_some())
                .collect();
            debug!(depth, entities = level.len(), "collected hierarchy level");
            if parents.is_empty() {
                break;
            }

            let parent_set: HashSet<EntityRef> = parents.iter().copied().collect();
            let mut next = Vec::new();
            for node in self.hierarchy.children(&parents) {
                let Some(parent) = node.parent().filter(|p| parent_set.contains(p)) else {
                    continue;
                };
                let child = node.entity_ref();
                let siblings = forest.children.entry(parent).or_default();
                if !siblings.contains(&child) {
                    siblings.push(child);
                }
                if seen.insert(child) {
                    next.push(child);
                }
            }

            level = next;
            depth += 1;
        }

        forest
    }
}

/// Per-entity progress plus the parent -> children edges of the collected
/// subtrees.
#[derive(Default)]
struct Forest {
    scores: HashMap<EntityRef, u8>,
    children: HashMap<EntityRef, Vec<EntityRef>>,
}

impl Forest {
    fn own(&self, entity: &EntityRef) -> f64 {
        f64::from(self.scores.get(entity).copied().unwrap_or(0))
    }

    fn children_of(&self, entity: &EntityRef) -> &[EntityRef] {
        self.children.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    fn flat(&self, root: &EntityRef) -> u8 {
        let mut visited = HashSet::new();
        let mut stack = vec![*root];
        let mut sum = 0.0;
        let mut count = 0usize;

        while let Some(entity) = stack.pop() {
            if !visited.insert(entity) {
                continue;
            }
            sum += self.own(&entity);
            count += 1;
            stack.extend_from_slice(self.children_of(&entity));
        }

        round_percent(sum / count as f64)
    }

    fn hierarchical(&self, root: &EntityRef) -> u8 {
        round_percent(self.subtree(root, &mut HashSet::new()))
    }

    fn subtree(&self, entity: &EntityRef, path: &mut HashSet<EntityRef>) -> f64 {
        path.insert(*entity);
        let mut sum = 0.0;
        let mut count = 0usize;
        for child in self.children_of(entity) {
            if path.contains(child) {
                continue;
            }
            sum += self.subtree(child, path);
            count += 1;
        }
        path.remove(entity);

        let own = self.own(entity);
        if count == 0 {
            own
        } else {
            (own + sum / count as f64) / 2.0
        }
    }
}

/// Rounds half up into 0..=100.
fn round_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}
