//! Hand-written conversions between models and remote DTOs
//!
//! Storage identity (ids, mates, synchronized flags, foreign keys) never
//! crosses the boundary. Models built from a DTO have every child collection
//! loaded. Remote children carry no clock of their own and take their root's
//! `updated_at`.

use chrono::{DateTime, Utc};

use super::dto::{
    BimElementExternalDto, DynamicFieldExternalDto, ItemExternalDto, ObjectiveExternalDto,
    ObjectiveTypeExternalDto, ProjectExternalDto,
};
use crate::error::Result;
use crate::models::{
    BimElement, BimElementObjective, DynamicField, FieldValue, Item, Objective, ObjectiveItem,
    Project,
};

fn to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub fn item_to_dto(item: &Item) -> ItemExternalDto {
    ItemExternalDto {
        external_id: item.external_id.clone(),
        relative_path: item.relative_path.clone(),
        item_type: item.item_type,
    }
}

pub fn item_from_dto(dto: &ItemExternalDto, updated_at: i64) -> Item {
    let mut item = Item::new(dto.relative_path.clone());
    item.external_id.clone_from(&dto.external_id);
    item.item_type = dto.item_type;
    item.updated_at = updated_at;
    item
}

pub fn bim_element_to_dto(element: &BimElement) -> BimElementExternalDto {
    BimElementExternalDto {
        global_id: element.global_id.clone(),
        parent_name: element.parent_name.clone(),
        element_name: element.element_name.clone(),
        element_type: element.element_type.clone(),
    }
}

pub fn bim_element_from_dto(dto: &BimElementExternalDto) -> BimElement {
    BimElement {
        id: 0,
        global_id: dto.global_id.clone(),
        parent_name: dto.parent_name.clone(),
        element_name: dto.element_name.clone(),
        element_type: dto.element_type.clone(),
    }
}

pub fn dynamic_field_to_dto(field: &DynamicField) -> DynamicFieldExternalDto {
    let (kind, value) = field.value.encode();
    DynamicFieldExternalDto {
        external_id: field.external_id.clone(),
        name: field.name.clone(),
        kind,
        value,
        children: field
            .children
            .iter()
            .flatten()
            .map(dynamic_field_to_dto)
            .collect(),
    }
}

/// Fails with `InvalidInput` when the text value does not parse for its kind.
pub fn dynamic_field_from_dto(dto: &DynamicFieldExternalDto, updated_at: i64) -> Result<DynamicField> {
    let value = FieldValue::decode(dto.kind, &dto.value)?;
    let mut field = DynamicField::new(dto.name.clone(), value);
    field.external_id.clone_from(&dto.external_id);
    field.updated_at = updated_at;
    field.children = Some(
        dto.children
            .iter()
            .map(|child| dynamic_field_from_dto(child, updated_at))
            .collect::<Result<Vec<_>>>()?,
    );
    Ok(field)
}

pub fn project_to_dto(project: &Project) -> ProjectExternalDto {
    ProjectExternalDto {
        external_id: project.external_id.clone(),
        title: project.title.clone(),
        items: project.items.iter().flatten().map(item_to_dto).collect(),
        updated_at: to_datetime(project.updated_at),
    }
}

pub fn project_from_dto(dto: &ProjectExternalDto) -> Project {
    let mut project = Project::new(dto.title.clone());
    project.external_id.clone_from(&dto.external_id);
    project.updated_at = dto.updated_at.timestamp_millis();
    project.items = Some(
        dto.items
            .iter()
            .map(|item| item_from_dto(item, project.updated_at))
            .collect(),
    );
    project
}

pub fn objective_to_dto(objective: &Objective) -> ObjectiveExternalDto {
    ObjectiveExternalDto {
        external_id: objective.external_id.clone(),
        project_external_id: objective.project_external_id.clone(),
        parent_objective_external_id: objective.parent_external_id.clone(),
        author_external_id: objective.author_external_id.clone(),
        title: objective.title.clone(),
        description: objective.description.clone(),
        status: objective.status,
        creation_date: to_datetime(objective.creation_date),
        due_date: to_datetime(objective.due_date),
        objective_type: ObjectiveTypeExternalDto {
            external_id: None,
            name: objective.objective_type.clone(),
        },
        items: objective
            .items
            .iter()
            .flatten()
            .map(|link| item_to_dto(&link.item))
            .collect(),
        bim_elements: objective
            .bim_elements
            .iter()
            .flatten()
            .map(|link| bim_element_to_dto(&link.bim_element))
            .collect(),
        dynamic_fields: objective
            .dynamic_fields
            .iter()
            .flatten()
            .map(dynamic_field_to_dto)
            .collect(),
        updated_at: to_datetime(objective.updated_at),
    }
}

pub fn objective_from_dto(dto: &ObjectiveExternalDto) -> Result<Objective> {
    let mut objective = Objective::new(0, dto.title.clone());
    objective.external_id.clone_from(&dto.external_id);
    objective.project_external_id.clone_from(&dto.project_external_id);
    objective.parent_external_id.clone_from(&dto.parent_objective_external_id);
    objective.author_external_id.clone_from(&dto.author_external_id);
    objective.description.clone_from(&dto.description);
    objective.status = dto.status;
    objective.creation_date = dto.creation_date.timestamp_millis();
    objective.due_date = dto.due_date.timestamp_millis();
    objective.objective_type.clone_from(&dto.objective_type.name);
    objective.updated_at = dto.updated_at.timestamp_millis();
    objective.items = Some(
        dto.items
            .iter()
            .map(|item| ObjectiveItem::new(0, item_from_dto(item, objective.updated_at)))
            .collect(),
    );
    objective.bim_elements = Some(
        dto.bim_elements
            .iter()
            .map(|element| BimElementObjective::new(0, bim_element_from_dto(element)))
            .collect(),
    );
    objective.dynamic_fields = Some(
        dto.dynamic_fields
            .iter()
            .map(|field| dynamic_field_from_dto(field, objective.updated_at))
            .collect::<Result<Vec<_>>>()?,
    );
    Ok(objective)
}
