use crate::context::{Context, LinkKind};
use crate::error::Result;
use crate::models::{Item, Project};
use crate::remote::mapping::{project_from_dto, project_to_dto};
use crate::remote::{ConnectionContext, ProjectExternalDto};
use crate::sync::external_ids::{ExternalIdUpdater, ItemExternalIdUpdater};
use crate::sync::merger::{Merger, ProjectMerger};
use crate::sync::tuple::SynchronizingTuple;

use super::SynchronizationStrategy;

/// Synchronizes projects and the items they own.
///
/// Stored projects are linked to the acting user, when there is one.
pub struct ProjectStrategy<'a, C> {
    connection: &'a C,
    merger: ProjectMerger,
    user_id: Option<i64>,
}

impl<'a, C: ConnectionContext> ProjectStrategy<'a, C> {
    pub fn new(connection: &'a C, user_id: Option<i64>) -> Self {
        Self {
            connection,
            merger: ProjectMerger::default(),
            user_id,
        }
    }
}

impl<C> ProjectStrategy<'_, C> {
    /// Link the acting user to the stored local and synchronized rows.
    fn link_user(&self, context: &mut Context, tuple: &SynchronizingTuple<Project>) {
        let Some(user_id) = self.user_id else {
            return;
        };
        for project in [tuple.local.as_ref(), tuple.synchronized.as_ref()]
            .into_iter()
            .flatten()
            .filter(|project| project.id != 0)
        {
            context.link(LinkKind::UserProject, user_id, project.id);
        }
    }
}

impl<C: ConnectionContext> SynchronizationStrategy<Project> for ProjectStrategy<'_, C> {
    type Dto = ProjectExternalDto;
    type Remote = C::Projects;

    fn remote(&self) -> &Self::Remote {
        self.connection.projects()
    }

    fn merger(&self) -> &dyn Merger<Project> {
        &self.merger
    }

    fn to_dto(&self, entity: &Project) -> ProjectExternalDto {
        project_to_dto(entity)
    }

    fn from_dto(&self, dto: &ProjectExternalDto) -> Result<Project> {
        Ok(project_from_dto(dto))
    }

    fn after_remote(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Project>) -> Result<()> {
        let remote_items: Vec<Item> = tuple
            .remote
            .as_ref()
            .and_then(|project| project.items.clone())
            .unwrap_or_default();
        if remote_items.is_empty() {
            return Ok(());
        }

        let targets = [tuple.local.as_mut(), tuple.synchronized.as_mut()]
            .into_iter()
            .flatten()
            .filter_map(|project| project.items.as_mut())
            .flat_map(|items| items.iter_mut())
            .collect();
        let updated = ItemExternalIdUpdater.update_external_ids(context, targets, &remote_items)?;
        if updated > 0 {
            tracing::debug!(updated, "Backfilled item external ids");
        }
        Ok(())
    }

    fn prepare(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Project>) -> Result<()> {
        self.link_user(context, tuple);
        Ok(())
    }

    fn after_persist(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Project>) -> Result<()> {
        self.link_user(context, tuple);
        Ok(())
    }
}
