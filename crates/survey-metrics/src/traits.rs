//! Collaborator traits for progress, hierarchy and survey writes.
//!
//! Together with [`DataTypeCatalog`] and [`ValueResolver`] from the executor
//! crate these are everything [`SurveyMetrics`](crate::SurveyMetrics) needs
//! from persistence. A repository type implementing all of them gets
//! [`SurveyStore`] for free.

use std::collections::HashMap;

use survey_formula_executor::{
    DataTypeCatalog, EntityId, EntityKind, EntityNode, EntityRef, SurveyId, ValueResolver,
};

/// Role of the user looking at progress; restricts which data types count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ViewerRole {
    /// Sees every data type.
    Administrator,
    /// Sees the data types open to contributors.
    #[default]
    Contributor,
}

/// Answer counts backing completion progress.
pub trait ProgressSource: Send + Sync {
    /// Whether `code` is collected in `survey`.
    fn is_active(&self, code: &str, survey: SurveyId) -> bool;

    /// Number of active, leaf, role-visible data types applying to `kind`.
    fn count_applicable(&self, kind: EntityKind, survey: SurveyId, role: ViewerRole) -> usize;

    /// Number of those data types with a stored value, per entity.
    ///
    /// Entities without any answer may be absent from the map.
    fn count_answered(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
        survey: SurveyId,
        role: ViewerRole,
    ) -> HashMap<EntityId, usize>;
}

/// Read access to the administration hierarchy.
pub trait EntityHierarchy: Send + Sync {
    /// Direct children of every entity in `parents`, in one lookup.
    fn children(&self, parents: &[EntityRef]) -> Vec<EntityNode>;

    /// Every active establishment.
    fn active_establishments(&self) -> Vec<EntityNode>;
}

/// Mapping from calendar years to survey campaigns.
pub trait SurveyCatalog: Send + Sync {
    /// The survey run for `year`, if any.
    fn survey_for_year(&self, year: i32) -> Option<SurveyId>;
}

/// Write access to formulas and answers.
pub trait SurveyWriter: Send + Sync {
    /// Stores the formula of an operation (creating the operation if needed).
    fn save_formula(&self, code: &str, formula: &str) -> Result<(), String>;

    /// Stores one answer.
    fn upsert_value(
        &self,
        code: &str,
        entity: &EntityRef,
        survey: SurveyId,
        value: &str,
    ) -> Result<(), String>;

    /// Deletes one answer; deleting an absent answer succeeds.
    fn delete_value(&self, code: &str, entity: &EntityRef, survey: SurveyId) -> Result<(), String>;
}

/// Everything the metrics facade needs from persistence.
pub trait SurveyStore:
    DataTypeCatalog + ValueResolver + ProgressSource + EntityHierarchy + SurveyCatalog + SurveyWriter
{
}

impl<T> SurveyStore for T where
    T: DataTypeCatalog
        + ValueResolver
        + ProgressSource
        + EntityHierarchy
        + SurveyCatalog
        + SurveyWriter
{
}
