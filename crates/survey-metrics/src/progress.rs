//! Completion progress of single entities.

use std::collections::HashMap;

use survey_formula_executor::{EntityId, EntityKind, EntityRef, SurveyId};
use tracing::debug;

use crate::traits::{ProgressSource, ViewerRole};

/// Percentage of `applicable` data types that are `answered`, rounded half
/// up and clamped to 100. Nothing applicable means 0.
///
/// ```rust
/// use survey_metrics::percentage;
///
/// assert_eq!(percentage(2, 3), 67);
/// assert_eq!(percentage(1, 8), 13);
/// assert_eq!(percentage(5, 0), 0);
/// ```
pub fn percentage(answered: usize, applicable: usize) -> u8 {
    if applicable == 0 {
        return 0;
    }
    let answered = answered.min(applicable) as u64;
    let applicable = applicable as u64;
    ((200 * answered + applicable) / (2 * applicable)) as u8
}

/// Progress of entities of one kind, backed by answer counts.
pub struct ProgressAggregator<'a> {
    source: &'a dyn ProgressSource,
}

impl<'a> ProgressAggregator<'a> {
    /// Creates an aggregator over the given counts.
    pub fn new(source: &'a dyn ProgressSource) -> Self {
        Self { source }
    }

    /// Progress of one entity.
    pub fn for_entity(&self, entity: &EntityRef, survey: SurveyId, role: ViewerRole) -> u8 {
        self.for_entities(entity.kind, &[entity.id], survey, role)
            .get(&entity.id)
            .copied()
            .unwrap_or(0)
    }

    /// Progress of many entities of the same kind.
    ///
    /// Issues one applicable count and one answered count for the whole
    /// batch, and none at all for an empty batch.
    pub fn for_entities(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        survey: SurveyId,
        role: ViewerRole,
    ) -> HashMap<EntityId, u8> {
        if ids.is_empty() {
            return HashMap::new();
        }

        let applicable = self.source.count_applicable(kind, survey, role);
        let answered = self.source.count_answered(kind, ids, survey, role);
        debug!(%kind, survey, entities = ids.len(), applicable, "computed progress batch");

        ids.iter()
            .map(|id| {
                let count = answered.get(id).copied().unwrap_or(0);
                (*id, percentage(count, applicable))
            })
            .collect()
    }
}
