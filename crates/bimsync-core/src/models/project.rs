//! Project model

use serde::{Deserialize, Serialize};

use super::{impl_synchronizable, same_loaded_children, DetachedCopy, Item, SyncEquivalent};

/// A project: the root that owns items and groups objectives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub external_id: Option<String>,
    pub title: String,
    pub synchronization_mate_id: Option<i64>,
    pub is_synchronized: bool,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Owned items; `None` until loaded
    #[serde(default)]
    pub items: Option<Vec<Item>>,
}

impl Project {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            external_id: None,
            title: title.into(),
            synchronization_mate_id: None,
            is_synchronized: false,
            updated_at: crate::util::unix_millis_now(),
            items: Some(Vec::new()),
        }
    }
}

impl_synchronizable!(Project);

impl SyncEquivalent for Project {
    fn same_content(&self, other: &Self) -> bool {
        self.title == other.title && same_loaded_children(self.items.as_ref(), other.items.as_ref())
    }
}

impl DetachedCopy for Project {
    fn detached_copy(&self) -> Self {
        Self {
            id: 0,
            synchronization_mate_id: None,
            is_synchronized: false,
            items: Some(Vec::new()),
            ..self.clone()
        }
    }
}
