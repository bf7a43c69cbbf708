//! Objective model

use serde::{Deserialize, Serialize};

use super::{
    impl_synchronizable, same_loaded_children, BimElementObjective, DetachedCopy, DynamicField,
    ObjectiveItem, SyncEquivalent,
};

/// Workflow status of an objective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    #[default]
    Undefined,
    Open,
    InProgress,
    Ready,
    Late,
    Closed,
}

impl ObjectiveStatus {
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Undefined => 0,
            Self::Open => 1,
            Self::InProgress => 2,
            Self::Ready => 3,
            Self::Late => 4,
            Self::Closed => 5,
        }
    }

    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::InProgress,
            3 => Self::Ready,
            4 => Self::Late,
            5 => Self::Closed,
            _ => Self::Undefined,
        }
    }
}

/// An objective (issue) inside a project.
///
/// Objectives form a hierarchy through `parent_objective_id`. The
/// `project_external_id` and `parent_external_id` fields are link keys: they
/// are resolved for every side of a tuple before merging and are not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: i64,
    pub external_id: Option<String>,
    /// Owning project; `0` until resolved
    pub project_id: i64,
    pub parent_objective_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub status: ObjectiveStatus,
    /// Unix ms
    pub creation_date: i64,
    /// Unix ms
    pub due_date: i64,
    pub objective_type: String,
    pub author_external_id: Option<String>,
    pub synchronization_mate_id: Option<i64>,
    pub is_synchronized: bool,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    #[serde(default)]
    pub project_external_id: Option<String>,
    #[serde(default)]
    pub parent_external_id: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<ObjectiveItem>>,
    #[serde(default)]
    pub bim_elements: Option<Vec<BimElementObjective>>,
    #[serde(default)]
    pub dynamic_fields: Option<Vec<DynamicField>>,
}

impl Objective {
    #[must_use]
    pub fn new(project_id: i64, title: impl Into<String>) -> Self {
        let now = crate::util::unix_millis_now();
        Self {
            id: 0,
            external_id: None,
            project_id,
            parent_objective_id: None,
            title: title.into(),
            description: String::new(),
            status: ObjectiveStatus::Open,
            creation_date: now,
            due_date: now,
            objective_type: String::new(),
            author_external_id: None,
            synchronization_mate_id: None,
            is_synchronized: false,
            updated_at: now,
            project_external_id: None,
            parent_external_id: None,
            items: Some(Vec::new()),
            bim_elements: Some(Vec::new()),
            dynamic_fields: Some(Vec::new()),
        }
    }

    /// Clears every child collection back to "not loaded".
    pub fn unload_children(&mut self) {
        self.items = None;
        self.bim_elements = None;
        self.dynamic_fields = None;
    }
}

impl_synchronizable!(Objective);

impl SyncEquivalent for Objective {
    fn same_content(&self, other: &Self) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.status == other.status
            && self.creation_date == other.creation_date
            && self.due_date == other.due_date
            && self.objective_type == other.objective_type
            && self.author_external_id == other.author_external_id
            && self.parent_external_id == other.parent_external_id
            && same_loaded_children(self.items.as_ref(), other.items.as_ref())
            && same_loaded_children(self.bim_elements.as_ref(), other.bim_elements.as_ref())
            && same_loaded_children(self.dynamic_fields.as_ref(), other.dynamic_fields.as_ref())
    }
}

impl DetachedCopy for Objective {
    fn detached_copy(&self) -> Self {
        Self {
            id: 0,
            project_id: 0,
            parent_objective_id: None,
            synchronization_mate_id: None,
            is_synchronized: false,
            items: Some(Vec::new()),
            bim_elements: Some(Vec::new()),
            dynamic_fields: Some(Vec::new()),
            ..self.clone()
        }
    }
}
