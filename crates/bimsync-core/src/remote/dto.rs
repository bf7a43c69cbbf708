//! Remote-facing data transfer objects
//!
//! These mirror what a remote connection exchanges. Dates travel as RFC 3339
//! timestamps; dynamic field values travel as a kind tag plus text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{FieldKind, ItemType, ObjectiveStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemExternalDto {
    #[serde(default)]
    pub external_id: Option<String>,
    pub relative_path: String,
    #[serde(default)]
    pub item_type: ItemType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BimElementExternalDto {
    pub global_id: String,
    pub parent_name: String,
    #[serde(default)]
    pub element_name: String,
    #[serde(default)]
    pub element_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicFieldExternalDto {
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub children: Vec<DynamicFieldExternalDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveTypeExternalDto {
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectExternalDto {
    #[serde(default)]
    pub external_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub items: Vec<ItemExternalDto>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveExternalDto {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub project_external_id: Option<String>,
    #[serde(default)]
    pub parent_objective_external_id: Option<String>,
    #[serde(default)]
    pub author_external_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ObjectiveStatus,
    pub creation_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub objective_type: ObjectiveTypeExternalDto,
    #[serde(default)]
    pub items: Vec<ItemExternalDto>,
    #[serde(default)]
    pub bim_elements: Vec<BimElementExternalDto>,
    #[serde(default)]
    pub dynamic_fields: Vec<DynamicFieldExternalDto>,
    pub updated_at: DateTime<Utc>,
}
