//! BIM element model

use serde::{Deserialize, Serialize};

use super::{DetachedCopy, SyncEquivalent};
use crate::util::eq_ignore_case;

/// An element of a BIM model referenced by objectives.
///
/// BIM elements are not synchronizable on their own: they carry no external
/// id and the local and synchronized objectives link the same row. They are
/// identified by the pair (global id, parent name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BimElement {
    pub id: i64,
    /// IFC global identifier
    pub global_id: String,
    /// Name of the model file that contains the element
    pub parent_name: String,
    pub element_name: String,
    pub element_type: String,
}

impl BimElement {
    #[must_use]
    pub fn new(global_id: impl Into<String>, parent_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            global_id: global_id.into(),
            parent_name: parent_name.into(),
            element_name: String::new(),
            element_type: String::new(),
        }
    }

    /// Natural-key match: same global id, parent name compared case-insensitively.
    pub fn same_element(&self, other: &Self) -> bool {
        self.global_id == other.global_id
            && eq_ignore_case(Some(&self.parent_name), Some(&other.parent_name))
    }
}

impl SyncEquivalent for BimElement {
    fn same_content(&self, other: &Self) -> bool {
        self.same_element(other)
            && self.element_name == other.element_name
            && self.element_type == other.element_type
    }
}

impl DetachedCopy for BimElement {
    fn detached_copy(&self) -> Self {
        Self {
            id: 0,
            ..self.clone()
        }
    }
}

/// Join record between an objective and a BIM element, with the element attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BimElementObjective {
    pub objective_id: i64,
    pub bim_element_id: i64,
    pub bim_element: BimElement,
}

impl BimElementObjective {
    #[must_use]
    pub fn new(objective_id: i64, bim_element: BimElement) -> Self {
        Self {
            objective_id,
            bim_element_id: bim_element.id,
            bim_element,
        }
    }
}

impl SyncEquivalent for BimElementObjective {
    fn same_content(&self, other: &Self) -> bool {
        self.bim_element.same_content(&other.bim_element)
    }
}
