//! Administration entities and survey identifiers.
//!
//! Establishments, documentary structures and physical libraries share one
//! capability trait, [`AdministrationEntity`], instead of a type hierarchy.

use std::fmt;

/// Identifier of an administration entity, unique within its kind.
pub type EntityId = u64;

/// Identifier of a yearly survey campaign.
pub type SurveyId = u32;

/// The three levels of the administration hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityKind {
    /// Top level; owns documentary structures.
    Establishment,
    /// Owned by an establishment; owns physical libraries.
    DocumentaryStructure,
    /// Leaf of the hierarchy.
    PhysicalLibrary,
}

impl EntityKind {
    /// Kind of the entities this kind owns, if any.
    pub fn child_kind(self) -> Option<EntityKind> {
        match self {
            EntityKind::Establishment => Some(EntityKind::DocumentaryStructure),
            EntityKind::DocumentaryStructure => Some(EntityKind::PhysicalLibrary),
            EntityKind::PhysicalLibrary => None,
        }
    }

    /// Kind of the owning entity, if any.
    pub fn parent_kind(self) -> Option<EntityKind> {
        match self {
            EntityKind::Establishment => None,
            EntityKind::DocumentaryStructure => Some(EntityKind::Establishment),
            EntityKind::PhysicalLibrary => Some(EntityKind::DocumentaryStructure),
        }
    }

    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Establishment => "establishment",
            EntityKind::DocumentaryStructure => "documentary_structure",
            EntityKind::PhysicalLibrary => "physical_library",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hashable key of an entity: its kind plus its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: EntityId,
}

impl EntityRef {
    /// Creates an entity key.
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    /// Key of an establishment.
    pub fn establishment(id: EntityId) -> Self {
        Self::new(EntityKind::Establishment, id)
    }

    /// Key of a documentary structure.
    pub fn documentary_structure(id: EntityId) -> Self {
        Self::new(EntityKind::DocumentaryStructure, id)
    }

    /// Key of a physical library.
    pub fn physical_library(id: EntityId) -> Self {
        Self::new(EntityKind::PhysicalLibrary, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Capability shared by every administration entity.
pub trait AdministrationEntity {
    /// The entity's level in the hierarchy.
    fn kind(&self) -> EntityKind;

    /// The entity's identifier.
    fn id(&self) -> EntityId;

    /// The owning entity; `None` for establishments.
    fn parent(&self) -> Option<EntityRef>;

    /// The entity's hashable key.
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

/// Plain carrier for an entity and its owner, as returned by hierarchy lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityNode {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: EntityId,
    /// Owning entity.
    pub parent: Option<EntityRef>,
}

impl EntityNode {
    /// An establishment (no owner).
    pub fn establishment(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Establishment,
            id,
            parent: None,
        }
    }

    /// A documentary structure owned by `establishment`.
    pub fn documentary_structure(id: EntityId, establishment: EntityId) -> Self {
        Self {
            kind: EntityKind::DocumentaryStructure,
            id,
            parent: Some(EntityRef::establishment(establishment)),
        }
    }

    /// A physical library owned by `structure`.
    pub fn physical_library(id: EntityId, structure: EntityId) -> Self {
        Self {
            kind: EntityKind::PhysicalLibrary,
            id,
            parent: Some(EntityRef::documentary_structure(structure)),
        }
    }
}

impl AdministrationEntity for EntityNode {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn parent(&self) -> Option<EntityRef> {
        self.parent
    }
}
