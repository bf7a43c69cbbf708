//! Fixture builders shared by the engine tests

use crate::context::Context;
use crate::models::{Item, Objective, Project};
use crate::remote::mapping::{objective_to_dto, project_to_dto};
use crate::remote::memory::{InMemoryConnection, RemoteSnapshot};
use crate::remote::{ObjectiveExternalDto, ProjectExternalDto};

pub fn remote_item(external_id: &str, path: &str) -> Item {
    let mut item = Item::new(path);
    item.external_id = Some(external_id.into());
    item
}

/// Remote project DTO with `(external id, path)` items.
pub fn remote_project(external_id: &str, title: &str, items: &[(&str, &str)]) -> ProjectExternalDto {
    let mut project = Project::new(title);
    project.external_id = Some(external_id.into());
    project.items = Some(
        items
            .iter()
            .map(|(external_id, path)| remote_item(external_id, path))
            .collect(),
    );
    project_to_dto(&project)
}

pub fn remote_objective(external_id: &str, project: &str, parent: Option<&str>) -> ObjectiveExternalDto {
    let mut objective = Objective::new(0, format!("Objective {external_id}"));
    objective.external_id = Some(external_id.into());
    objective.project_external_id = Some(project.into());
    objective.parent_external_id = parent.map(str::to_string);
    objective_to_dto(&objective)
}

pub fn seeded_connection(
    projects: Vec<ProjectExternalDto>,
    objectives: Vec<ObjectiveExternalDto>,
) -> InMemoryConnection {
    InMemoryConnection::from_snapshot(1, RemoteSnapshot { projects, objectives })
}

/// A synchronized project and its mated local copy, both stored.
pub fn stored_pair(context: &mut Context, external_id: &str, title: &str) -> (Project, Project) {
    let mut synced = Project::new(title);
    synced.is_synchronized = true;
    synced.external_id = Some(external_id.into());
    context.add(&mut synced);

    let mut local = Project::new(title);
    local.external_id = Some(external_id.into());
    local.synchronization_mate_id = Some(synced.id);
    context.add(&mut local);
    (local, synced)
}

pub fn local_project(context: &Context, title: &str) -> Option<Project> {
    context
        .find::<Project>(|project| !project.is_synchronized && project.title == title)
        .cloned()
}

pub fn local_objective(context: &Context, external_id: &str) -> Option<Objective> {
    context
        .find::<Objective>(|objective| {
            !objective.is_synchronized && objective.external_id.as_deref() == Some(external_id)
        })
        .cloned()
}
