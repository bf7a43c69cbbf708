//! Item model

use serde::{Deserialize, Serialize};

use super::{impl_synchronizable, DetachedCopy, SyncEquivalent};

/// Kind of file an item refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    File,
    Media,
    Bim,
}

impl ItemType {
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::File => 0,
            Self::Media => 1,
            Self::Bim => 2,
        }
    }

    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Media,
            2 => Self::Bim,
            _ => Self::File,
        }
    }
}

/// A file attached to a project or to objectives, identified by its relative path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub external_id: Option<String>,
    /// Path relative to the project root; the natural key of an item
    pub relative_path: String,
    pub name: String,
    pub item_type: ItemType,
    /// Owning project, if the item belongs to one
    pub project_id: Option<i64>,
    pub synchronization_mate_id: Option<i64>,
    pub is_synchronized: bool,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Item {
    /// Create a local item for the given relative path.
    ///
    /// The name is the last path segment.
    #[must_use]
    pub fn new(relative_path: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let name = relative_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            id: 0,
            external_id: None,
            relative_path,
            name,
            item_type: ItemType::File,
            project_id: None,
            synchronization_mate_id: None,
            is_synchronized: false,
            updated_at: crate::util::unix_millis_now(),
        }
    }

    /// Natural-key match used when no identity is shared yet.
    pub fn same_path(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
    }
}

impl_synchronizable!(Item);

impl SyncEquivalent for Item {
    fn same_content(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
            && self.name == other.name
            && self.item_type == other.item_type
    }
}

impl DetachedCopy for Item {
    fn detached_copy(&self) -> Self {
        Self {
            id: 0,
            project_id: None,
            synchronization_mate_id: None,
            is_synchronized: false,
            ..self.clone()
        }
    }
}

/// Join record between an objective and an item, with the item attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveItem {
    pub objective_id: i64,
    pub item_id: i64,
    pub item: Item,
}

impl ObjectiveItem {
    #[must_use]
    pub fn new(objective_id: i64, item: Item) -> Self {
        Self {
            objective_id,
            item_id: item.id,
            item,
        }
    }
}

impl SyncEquivalent for ObjectiveItem {
    fn same_content(&self, other: &Self) -> bool {
        self.item.same_content(&other.item)
    }
}
