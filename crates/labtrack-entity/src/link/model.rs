//! Entity-to-folder link model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::folder::StorageDriveFolder;

/// The kind of business entity a folder is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entity_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A research program.
    Program,
    /// A study within a program.
    Study,
    /// An assay within a study.
    Assay,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program => write!(f, "program"),
            Self::Study => write!(f, "study"),
            Self::Assay => write!(f, "assay"),
        }
    }
}

/// A reference to a business entity owned by another service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: Uuid,
}

impl EntityRef {
    /// Reference a program.
    pub fn program(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Program,
            id,
        }
    }

    /// Reference a study.
    pub fn study(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Study,
            id,
        }
    }

    /// Reference an assay.
    pub fn assay(id: Uuid) -> Self {
        Self {
            kind: EntityKind::Assay,
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A persisted link between an entity and one of its folder bindings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityFolderLink {
    /// Unique link identifier.
    pub id: Uuid,
    /// Entity kind.
    pub entity_kind: EntityKind,
    /// Entity identifier.
    pub entity_id: Uuid,
    /// The bound folder.
    pub folder_id: Uuid,
    /// Whether this is the entity's primary folder. At most one per entity.
    pub is_primary: bool,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

impl EntityFolderLink {
    /// The linked entity.
    pub fn entity(&self) -> EntityRef {
        EntityRef {
            kind: self.entity_kind,
            id: self.entity_id,
        }
    }
}

/// Where an entity stands with respect to its primary folder.
#[derive(Debug, Clone)]
pub enum BindingState {
    /// The entity has no folder.
    Unbound,
    /// The entity's folder lives on an active drive.
    Bound(StorageDriveFolder),
    /// The entity's folder lives on a deactivated drive. The binding is kept
    /// for history, but reads report a configuration error.
    Orphaned(StorageDriveFolder),
}

impl BindingState {
    /// The bound folder, whether live or orphaned.
    pub fn folder(&self) -> Option<&StorageDriveFolder> {
        match self {
            Self::Unbound => None,
            Self::Bound(f) | Self::Orphaned(f) => Some(f),
        }
    }

    /// Whether the binding can be used.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}
