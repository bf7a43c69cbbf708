//! Field-level mergers
//!
//! A merger copies simple field values between the sides of one tuple and
//! hands composite content to the children mergers. Per field:
//!
//! - changed on one side only: that side's value wins;
//! - changed on both sides to different values: the side with the later
//!   `updated_at` wins, ties and missing timestamps go to the remote side;
//! - no baseline: local and remote are compared directly under the same
//!   conflict rule.
//!
//! Every side whose value is replaced is marked changed.

use super::children_mergers::{
    nested_dynamic_fields, objective_bim_elements, objective_dynamic_fields, objective_items,
    project_items,
};
use super::entity::SyncEntity;
use super::tuple::{ObjectType, SynchronizingTuple};
use crate::context::Context;
use crate::error::Result;
use crate::models::{BimElement, DynamicField, Item, Objective, Project};

/// Merges the sides of a tuple in place
pub trait Merger<T> {
    fn merge(&self, context: &mut Context, tuple: &mut SynchronizingTuple<T>) -> Result<()>;
}

fn local_is_newer<T: SyncEntity>(tuple: &SynchronizingTuple<T>) -> bool {
    match (
        tuple.local.as_ref().and_then(SyncEntity::clock),
        tuple.remote.as_ref().and_then(SyncEntity::clock),
    ) {
        (Some(local), Some(remote)) => local > remote,
        _ => false,
    }
}

fn side_value<T, V: Clone>(
    tuple: &mut SynchronizingTuple<T>,
    side: ObjectType,
    field: &impl Fn(&mut T) -> &mut V,
) -> Option<V> {
    tuple.get_mut(side).map(|entity| field(entity).clone())
}

/// Three-way merge of one field across the sides of `tuple`.
pub fn merge_value<T, V>(tuple: &mut SynchronizingTuple<T>, field: impl Fn(&mut T) -> &mut V)
where
    T: SyncEntity,
    V: Clone + PartialEq,
{
    let (Some(local), Some(remote)) = (
        side_value(tuple, ObjectType::Local, &field),
        side_value(tuple, ObjectType::Remote, &field),
    ) else {
        return;
    };
    let baseline = if tuple.has_real_baseline() {
        side_value(tuple, ObjectType::Synchronized, &field)
    } else {
        None
    };

    let winner = match baseline {
        Some(baseline) if local == baseline => remote,
        Some(baseline) if remote == baseline => local,
        _ if local == remote => local,
        _ if local_is_newer(tuple) => local,
        _ => remote,
    };

    for side in ObjectType::ALL {
        let replaced = tuple.get_mut(side).is_some_and(|entity| {
            let slot = field(entity);
            if *slot == winner {
                false
            } else {
                *slot = winner.clone();
                true
            }
        });
        if replaced {
            tuple.mark_changed(side);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemMerger;

impl Merger<Item> for ItemMerger {
    fn merge(&self, _context: &mut Context, tuple: &mut SynchronizingTuple<Item>) -> Result<()> {
        merge_value(tuple, |item| &mut item.relative_path);
        merge_value(tuple, |item| &mut item.name);
        merge_value(tuple, |item| &mut item.item_type);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BimElementMerger;

impl Merger<BimElement> for BimElementMerger {
    fn merge(&self, _context: &mut Context, tuple: &mut SynchronizingTuple<BimElement>) -> Result<()> {
        merge_value(tuple, |element| &mut element.element_name);
        merge_value(tuple, |element| &mut element.element_type);
        Ok(())
    }
}

/// Merges dynamic fields and their nested fields, stamping the stored sides
/// with the connection they are synchronized through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicFieldMerger {
    connection_info_id: Option<i64>,
}

impl DynamicFieldMerger {
    pub const fn new(connection_info_id: Option<i64>) -> Self {
        Self { connection_info_id }
    }
}

impl Merger<DynamicField> for DynamicFieldMerger {
    fn merge(&self, context: &mut Context, tuple: &mut SynchronizingTuple<DynamicField>) -> Result<()> {
        merge_value(tuple, |field| &mut field.name);
        merge_value(tuple, |field| &mut field.value);
        nested_dynamic_fields(self).merge(context, tuple)?;

        if let Some(connection_info_id) = self.connection_info_id {
            for side in [ObjectType::Local, ObjectType::Synchronized] {
                let stamped = tuple.get_mut(side).is_some_and(|field| {
                    let changed = field.connection_info_id != Some(connection_info_id);
                    field.connection_info_id = Some(connection_info_id);
                    changed
                });
                if stamped {
                    tuple.mark_changed(side);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectMerger {
    items: ItemMerger,
}

impl Merger<Project> for ProjectMerger {
    fn merge(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Project>) -> Result<()> {
        merge_value(tuple, |project| &mut project.title);
        project_items(&self.items).merge(context, tuple)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectiveMerger {
    items: ItemMerger,
    bim_elements: BimElementMerger,
    dynamic_fields: DynamicFieldMerger,
}

impl ObjectiveMerger {
    pub const fn new(connection_info_id: Option<i64>) -> Self {
        Self {
            items: ItemMerger,
            bim_elements: BimElementMerger,
            dynamic_fields: DynamicFieldMerger::new(connection_info_id),
        }
    }
}

impl Merger<Objective> for ObjectiveMerger {
    fn merge(&self, context: &mut Context, tuple: &mut SynchronizingTuple<Objective>) -> Result<()> {
        merge_value(tuple, |objective| &mut objective.title);
        merge_value(tuple, |objective| &mut objective.description);
        merge_value(tuple, |objective| &mut objective.status);
        merge_value(tuple, |objective| &mut objective.creation_date);
        merge_value(tuple, |objective| &mut objective.due_date);
        merge_value(tuple, |objective| &mut objective.objective_type);
        merge_value(tuple, |objective| &mut objective.author_external_id);
        merge_value(tuple, |objective| &mut objective.parent_external_id);

        objective_items(&self.items).merge(context, tuple)?;
        objective_bim_elements(&self.bim_elements).merge(context, tuple)?;
        objective_dynamic_fields(&self.dynamic_fields).merge(context, tuple)
    }
}
