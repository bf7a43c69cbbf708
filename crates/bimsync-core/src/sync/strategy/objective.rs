use crate::context::{Context, Record};
use crate::error::{Error, Result};
use crate::models::{DynamicField, Item, Objective, Project, Synchronizable};
use crate::remote::mapping::{objective_from_dto, objective_to_dto};
use crate::remote::{ConnectionContext, ObjectiveExternalDto};
use crate::sync::external_ids::{
    DynamicFieldExternalIdUpdater, ExternalIdUpdater, ItemExternalIdUpdater,
};
use crate::sync::merger::{Merger, ObjectiveMerger};
use crate::sync::tuple::{ObjectType, SynchronizingTuple};

use super::{order_by_parent, SynchronizationStrategy};

/// Synchronizes objectives with their items, BIM elements and dynamic fields.
///
/// Objectives reference their project and parent objective through the
/// `project_external_id` and `parent_external_id` link keys. Keys are
/// refreshed from the stored ids before merging and resolved back to the
/// ids of each side afterwards.
pub struct ObjectiveStrategy<'a, C> {
    connection: &'a C,
    merger: ObjectiveMerger,
}

impl<'a, C: ConnectionContext> ObjectiveStrategy<'a, C> {
    pub fn new(connection: &'a C) -> Self {
        Self {
            connection,
            merger: ObjectiveMerger::new(Some(connection.connection_info_id())),
        }
    }
}

/// Row id of the local entity known remotely as `external_id`.
fn local_id_by_external_id<T>(context: &Context, external_id: &str) -> Option<i64>
where
    T: Record + Synchronizable,
{
    context
        .find::<T>(|row| !row.is_synchronized() && row.external_id() == Some(external_id))
        .or_else(|| {
            context
                .synchronized_by_external_id::<T>(external_id)
                .and_then(|synchronized| context.local_of(synchronized))
        })
        .map(Record::id)
}

fn synchronized_id_by_external_id<T>(context: &Context, external_id: &str) -> Option<i64>
where
    T: Record + Synchronizable,
{
    context
        .synchronized_by_external_id::<T>(external_id)
        .map(Record::id)
}

/// Re-derive the link keys from the ids stored on `objective`.
///
/// Fails when the stored parent has never been synchronized.
fn refresh_link_keys(context: &Context, objective: &mut Objective) -> Result<()> {
    if objective.project_id != 0 {
        if let Some(key) = context
            .get::<Project>(objective.project_id)
            .and_then(|project| context.external_id_through_mate(project))
        {
            objective.project_external_id = Some(key);
        }
    }
    if let Some(parent) = objective
        .parent_objective_id
        .and_then(|parent_id| context.get::<Objective>(parent_id))
    {
        let key = context.external_id_through_mate(parent).ok_or_else(|| {
            Error::Invariant(format!(
                "objective '{}' has parent '{}' that is not synchronized",
                objective.title, parent.title
            ))
        })?;
        objective.parent_external_id = Some(key);
    }
    Ok(())
}

/// Point `objective` at the project its key names. Returns whether the id changed.
fn resolve_project(context: &Context, objective: &mut Objective, side: ObjectType) -> Result<bool> {
    let resolved = objective.project_external_id.as_deref().and_then(|key| match side {
        ObjectType::Synchronized => synchronized_id_by_external_id::<Project>(context, key),
        _ => local_id_by_external_id::<Project>(context, key),
    });

    match resolved {
        Some(project_id) if project_id != objective.project_id => {
            objective.project_id = project_id;
            Ok(true)
        }
        Some(_) => Ok(false),
        None if objective.project_id != 0 && side == ObjectType::Local => Ok(false),
        None => Err(Error::Invariant(format!(
            "objective '{}' references project {} that is not synchronized",
            objective.title,
            objective.project_external_id.as_deref().unwrap_or("<none>")
        ))),
    }
}

/// Point `objective` at the parent its key names. Returns whether the id changed.
fn resolve_parent(context: &Context, objective: &mut Objective, side: ObjectType) -> Result<bool> {
    let resolved = match objective.parent_external_id.as_deref() {
        None => None,
        Some(key) => {
            let parent_id = match side {
                ObjectType::Synchronized => synchronized_id_by_external_id::<Objective>(context, key),
                _ => local_id_by_external_id::<Objective>(context, key),
            };
            let parent_id = parent_id.ok_or_else(|| {
                Error::Invariant(format!(
                    "objective '{}' references parent objective {key} that is not synchronized",
                    objective.title
                ))
            })?;
            Some(parent_id).filter(|parent_id| *parent_id != objective.id)
        }
    };

    if resolved == objective.parent_objective_id {
        Ok(false)
    } else {
        objective.parent_objective_id = resolved;
        Ok(true)
    }
}

impl<C: ConnectionContext> SynchronizationStrategy<Objective> for ObjectiveStrategy<'_, C> {
    type Dto = ObjectiveExternalDto;
    type Remote = C::Objectives;

    fn remote(&self) -> &Self::Remote {
        self.connection.objectives()
    }

    fn merger(&self) -> &dyn Merger<Objective> {
        &self.merger
    }

    fn to_dto(&self, entity: &Objective) -> ObjectiveExternalDto {
        objective_to_dto(entity)
    }

    fn from_dto(&self, dto: &ObjectiveExternalDto) -> Result<Objective> {
        objective_from_dto(dto)
    }

    fn order(&self, _context: &Context, tuples: Vec<SynchronizingTuple<Objective>>) -> Vec<SynchronizingTuple<Objective>> {
        order_by_parent(tuples)
    }

    fn prepare(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Objective>) -> Result<()> {
        for side in [ObjectType::Local, ObjectType::Synchronized] {
            let Some(objective) = tuple.get_mut(side) else {
                continue;
            };
            refresh_link_keys(context, objective)?;
            if resolve_project(context, objective, side)? {
                tuple.mark_changed(side);
            }
        }
        Ok(())
    }

    fn after_merge(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Objective>) -> Result<()> {
        for side in [ObjectType::Local, ObjectType::Synchronized] {
            let Some(objective) = tuple.get_mut(side) else {
                continue;
            };
            if resolve_parent(context, objective, side)? {
                tuple.mark_changed(side);
            }
        }

        if let Some(remote) = tuple.remote.as_ref() {
            if remote.project_external_id.is_none() {
                return Err(Error::Invariant(format!(
                    "objective '{}' has no remote project",
                    remote.title
                )));
            }
        }
        Ok(())
    }

    fn after_remote(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Objective>) -> Result<()> {
        let Some(remote) = tuple.remote.as_ref() else {
            return Ok(());
        };
        let remote_items: Vec<Item> = remote
            .items
            .iter()
            .flatten()
            .map(|link| link.item.clone())
            .collect();
        let remote_fields: Vec<DynamicField> = remote.dynamic_fields.clone().unwrap_or_default();

        let mut updated = 0;
        for objective in [tuple.local.as_mut(), tuple.synchronized.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Some(items) = objective.items.as_mut() {
                let targets = items.iter_mut().map(|link| &mut link.item).collect();
                updated += ItemExternalIdUpdater.update_external_ids(context, targets, &remote_items)?;
            }
            if let Some(fields) = objective.dynamic_fields.as_mut() {
                updated += DynamicFieldExternalIdUpdater.update_external_ids(
                    context,
                    fields.iter_mut().collect(),
                    &remote_fields,
                )?;
            }
        }
        if updated > 0 {
            tracing::debug!(updated, "Backfilled objective child external ids");
        }
        Ok(())
    }
}
