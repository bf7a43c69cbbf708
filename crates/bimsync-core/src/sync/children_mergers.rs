//! Child collection configurations of projects, objectives and dynamic fields

use super::children::{ChildLink, ChildrenMerger};
use super::merger::Merger;
use super::tuple::{ObjectType, SynchronizingTuple};
use crate::context::{Context, LinkKind};
use crate::error::Result;
use crate::models::{
    BimElement, BimElementObjective, DynamicField, Item, Objective, ObjectiveItem, Project,
};

fn compatible_external_ids(left: Option<&str>, right: Option<&str>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left == right,
        _ => true,
    }
}

fn sides<T>(tuple: &SynchronizingTuple<T>) -> impl Iterator<Item = &T> {
    ObjectType::ALL.into_iter().filter_map(|side| tuple.get(side))
}

/// Items pair up by relative path when their external ids do not disagree.
fn item_belongs(tuple: &SynchronizingTuple<Item>, candidate: &Item) -> bool {
    let mut members = sides(tuple).peekable();
    members.peek().is_some()
        && members.all(|item| {
            item.same_path(candidate)
                && compatible_external_ids(item.external_id.as_deref(), candidate.external_id.as_deref())
        })
}

fn field_belongs(tuple: &SynchronizingTuple<DynamicField>, candidate: &DynamicField) -> bool {
    let mut members = sides(tuple).peekable();
    members.peek().is_some()
        && members.all(|field| {
            field.same_slot(candidate)
                && compatible_external_ids(field.external_id.as_deref(), candidate.external_id.as_deref())
        })
}

fn element_belongs(tuple: &SynchronizingTuple<BimElement>, candidate: &BimElement) -> bool {
    sides(tuple).any(|element| element.same_element(candidate))
}

fn objective_item_links(objective: &mut Objective) -> &mut Option<Vec<ObjectiveItem>> {
    &mut objective.items
}

fn objective_item(link: &ObjectiveItem) -> &Item {
    &link.item
}

fn objective_element_links(objective: &mut Objective) -> &mut Option<Vec<BimElementObjective>> {
    &mut objective.bim_elements
}

fn objective_element(link: &BimElementObjective) -> &BimElement {
    &link.bim_element
}

fn objective_fields(objective: &mut Objective) -> &mut Option<Vec<DynamicField>> {
    &mut objective.dynamic_fields
}

fn project_item_rows(project: &mut Project) -> &mut Option<Vec<Item>> {
    &mut project.items
}

fn nested_fields(field: &mut DynamicField) -> &mut Option<Vec<DynamicField>> {
    &mut field.children
}

fn unlink_objective_item(context: &mut Context, objective_id: i64, item: &Item) -> Result<()> {
    context.unlink(LinkKind::ObjectiveItem, objective_id, item.id);
    Ok(())
}

fn unlink_bim_element(context: &mut Context, objective_id: i64, element: &BimElement) -> Result<()> {
    context.unlink(LinkKind::BimElementObjective, objective_id, element.id);
    Ok(())
}

fn remove_field(context: &mut Context, _parent_id: i64, field: &DynamicField) -> Result<()> {
    context.remove::<DynamicField>(field.id);
    Ok(())
}

fn release_project_item(context: &mut Context, _project_id: i64, item: &Item) -> Result<()> {
    let Some(mut row) = context.get::<Item>(item.id).cloned() else {
        return Ok(());
    };
    if row.project_id.is_some() {
        row.project_id = None;
        context.update(&mut row)?;
    }
    Ok(())
}

/// Reuse a local item for an item linked remotely: the one already known
/// by the remote external id wherever it lives, else the project's item with
/// the same path.
fn attach_objective_item(context: &Context, objective: &Objective, remote: &Item) -> Option<Item> {
    if let Some(external_id) = remote.external_id.as_deref() {
        let known = context.find::<Item>(|row| {
            !row.is_synchronized
                && context.external_id_through_mate(row).as_deref() == Some(external_id)
        });
        if let Some(row) = known {
            return Some(row.clone());
        }
    }

    if objective.project_id == 0 {
        return None;
    }
    context
        .find::<Item>(|row| {
            !row.is_synchronized
                && row.project_id == Some(objective.project_id)
                && row.same_path(remote)
                && compatible_external_ids(
                    context.external_id_through_mate(row).as_deref(),
                    remote.external_id.as_deref(),
                )
        })
        .cloned()
}

fn attach_bim_element(context: &Context, _objective: &Objective, remote: &BimElement) -> Option<BimElement> {
    context
        .find::<BimElement>(|row| row.same_element(remote))
        .cloned()
}

fn objective_item_unused(context: &Context, item: &Item) -> bool {
    item.project_id.is_none() && context.objectives_linking_item(item.id).is_empty()
}

fn project_item_unused(context: &Context, item: &Item) -> bool {
    context.objectives_linking_item(item.id).is_empty()
}

fn bim_element_unused(context: &Context, element: &BimElement) -> bool {
    context.objectives_linking_bim_element(element.id).is_empty()
}

/// Items linked to an objective. Released items survive while a project or
/// another objective still holds them.
pub fn objective_items(merger: &dyn Merger<Item>) -> ChildrenMerger<'_, Objective, ObjectiveItem, Item> {
    ChildrenMerger::new(
        merger,
        ChildLink::joined(
            objective_item_links,
            objective_item,
            ObjectiveItem::new,
            Context::load_objective_items,
        ),
        item_belongs,
        unlink_objective_item,
    )
    .with_attacher(attach_objective_item)
    .with_removal_guard(objective_item_unused)
}

/// BIM elements linked to an objective. Elements are shared rows, removed
/// once no objective links them.
pub fn objective_bim_elements(
    merger: &dyn Merger<BimElement>,
) -> ChildrenMerger<'_, Objective, BimElementObjective, BimElement> {
    ChildrenMerger::new(
        merger,
        ChildLink::joined(
            objective_element_links,
            objective_element,
            BimElementObjective::new,
            Context::load_bim_elements,
        ),
        element_belongs,
        unlink_bim_element,
    )
    .with_attacher(attach_bim_element)
    .with_removal_guard(bim_element_unused)
}

pub fn objective_dynamic_fields(
    merger: &dyn Merger<DynamicField>,
) -> ChildrenMerger<'_, Objective, DynamicField, DynamicField> {
    ChildrenMerger::new(
        merger,
        ChildLink::owned(objective_fields, Context::load_dynamic_fields),
        field_belongs,
        remove_field,
    )
}

/// Items owned by a project. Released items lose their project and are
/// removed unless an objective still links them.
pub fn project_items(merger: &dyn Merger<Item>) -> ChildrenMerger<'_, Project, Item, Item> {
    ChildrenMerger::new(
        merger,
        ChildLink::owned(project_item_rows, Context::load_project_items),
        item_belongs,
        release_project_item,
    )
    .with_removal_guard(project_item_unused)
}

pub fn nested_dynamic_fields(
    merger: &dyn Merger<DynamicField>,
) -> ChildrenMerger<'_, DynamicField, DynamicField, DynamicField> {
    ChildrenMerger::new(
        merger,
        ChildLink::owned(nested_fields, Context::load_nested_fields),
        field_belongs,
        remove_field,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use crate::sync::merger::{BimElementMerger, DynamicFieldMerger, ItemMerger, ObjectiveMerger};
    use pretty_assertions::assert_eq;

    /// A local objective mated to a synchronized one, both stored.
    fn stored_objective_pair(context: &mut Context) -> (Objective, Objective) {
        let mut project = Project::new("Tower");
        context.add(&mut project);
        let mut synced = Objective::new(project.id, "Railing");
        synced.is_synchronized = true;
        synced.external_id = Some("ext-10".into());
        context.add(&mut synced);
        let mut local = Objective::new(project.id, "Railing");
        local.synchronization_mate_id = Some(synced.id);
        context.add(&mut local);
        (local, synced)
    }

    fn synced_item_pair(context: &mut Context, path: &str, external_id: &str) -> (Item, Item) {
        let mut synced = Item::new(path);
        synced.is_synchronized = true;
        synced.external_id = Some(external_id.into());
        context.add(&mut synced);
        let mut local = Item::new(path);
        local.synchronization_mate_id = Some(synced.id);
        context.add(&mut local);
        (local, synced)
    }

    fn objective_tuple(context: &Context, local: i64, synced: i64, remote: Objective) -> SynchronizingTuple<Objective> {
        SynchronizingTuple::new(
            context.load_objective_graph(local),
            context.load_objective_graph(synced),
            Some(remote),
        )
        .unwrap()
    }

    #[test]
    fn remote_item_is_added_locally() {
        let mut context = Context::new();
        let (local, synced) = stored_objective_pair(&mut context);
        let mut remote = Objective::new(0, "Railing");
        let mut remote_item = Item::new("/photos/1.jpg");
        remote_item.external_id = Some("ext-20".into());
        remote.items = Some(vec![ObjectiveItem::new(0, remote_item)]);

        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();
        assert!(tuple.local_changed());
        assert!(tuple.synchronized_changed());
        assert!(!tuple.remote_changed());

        let mut local = tuple.local.unwrap();
        context.update(&mut local).unwrap();
        let linked = context.load_objective_items(local.id);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].item.external_id.as_deref(), Some("ext-20"));
        assert!(context.verify_mates().is_ok());
    }

    #[test]
    fn unlinked_item_survives_while_project_owns_it() {
        let mut context = Context::new();
        let (mut local, mut synced) = stored_objective_pair(&mut context);
        let (mut local_item, synced_item) = synced_item_pair(&mut context, "/a.txt", "ext-1");
        local_item.project_id = Some(local.project_id);
        context.update(&mut local_item).unwrap();
        local.items = Some(vec![ObjectiveItem::new(local.id, local_item.clone())]);
        context.update(&mut local).unwrap();
        synced.items = Some(vec![ObjectiveItem::new(synced.id, synced_item.clone())]);
        context.update(&mut synced).unwrap();

        // the remote objective no longer links the item
        let remote = Objective::new(0, "Railing");
        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();

        let mut local = tuple.local.unwrap();
        context.update(&mut local).unwrap();
        assert!(context.load_objective_items(local.id).is_empty());
        assert!(context.get::<Item>(local_item.id).is_some());
        assert!(context.get::<Item>(synced_item.id).is_some());
    }

    /// Local and synchronized objectives linking a mated item pair.
    fn linked_item(context: &mut Context) -> (Objective, Objective, Item, Item) {
        let (mut local, mut synced) = stored_objective_pair(context);
        let (local_item, synced_item) = synced_item_pair(context, "/a.txt", "ext-1");
        local.items = Some(vec![ObjectiveItem::new(local.id, local_item.clone())]);
        context.update(&mut local).unwrap();
        synced.items = Some(vec![ObjectiveItem::new(synced.id, synced_item.clone())]);
        context.update(&mut synced).unwrap();
        (local, synced, local_item, synced_item)
    }

    #[test]
    fn remote_item_reuses_row_linked_by_another_objective() {
        let mut context = Context::new();
        let (_, _, local_item, synced_item) = linked_item(&mut context);
        let (other, other_synced) = stored_objective_pair(&mut context);
        let mut remote = Objective::new(0, "Railing");
        let mut remote_item = Item::new("/a.txt");
        remote_item.external_id = Some("ext-1".into());
        remote.items = Some(vec![ObjectiveItem::new(0, remote_item)]);

        let mut tuple = objective_tuple(&context, other.id, other_synced.id, remote);
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();
        let mut local = tuple.local.unwrap();
        context.update(&mut local).unwrap();
        let mut synced = tuple.synchronized.unwrap();
        context.update(&mut synced).unwrap();

        assert_eq!(context.count::<Item>(), 2);
        let links = context.links(LinkKind::ObjectiveItem);
        assert!(links.contains(other.id, local_item.id));
        assert!(links.contains(other_synced.id, synced_item.id));
        assert!(context.verify_mates().is_ok());
    }

    #[test]
    fn item_linked_elsewhere_survives_removal() {
        let mut context = Context::new();
        let (local, synced, local_item, synced_item) = linked_item(&mut context);
        let mut other = Objective::new(local.project_id, "Stairs");
        other.items = Some(vec![ObjectiveItem::new(0, local_item.clone())]);
        context.add(&mut other);

        let remote = Objective::new(0, "Railing");
        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();

        let links = context.links(LinkKind::ObjectiveItem);
        assert!(!links.contains(local.id, local_item.id));
        assert!(links.contains(other.id, local_item.id));
        assert!(context.get::<Item>(local_item.id).is_some());
        assert!(context.get::<Item>(synced_item.id).is_some());
        assert!(context.verify_mates().is_ok());
    }

    #[test]
    fn item_linked_once_is_deleted() {
        let mut context = Context::new();
        let (local, synced, local_item, synced_item) = linked_item(&mut context);

        let remote = Objective::new(0, "Railing");
        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();

        assert!(tuple.local_changed());
        assert!(context.get::<Item>(local_item.id).is_none());
        assert!(context.get::<Item>(synced_item.id).is_none());
        assert!(context.verify_mates().is_ok());
    }

    #[test]
    fn consistent_collection_is_left_alone() {
        let mut context = Context::new();
        let (local, synced, _, _) = linked_item(&mut context);
        let mut remote = Objective::new(0, "Railing");
        let mut remote_item = Item::new("/a.txt");
        remote_item.external_id = Some("ext-1".into());
        remote.items = Some(vec![ObjectiveItem::new(0, remote_item)]);
        context.mark_clean();

        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();

        assert!(!tuple.local_changed());
        assert!(!tuple.synchronized_changed());
        assert!(!tuple.remote_changed());
        assert!(!context.has_changes());
    }

    #[test]
    fn item_dropped_locally_is_unlinked_remotely() {
        let mut context = Context::new();
        let (mut local, mut synced) = stored_objective_pair(&mut context);
        let (local_item, synced_item) = synced_item_pair(&mut context, "/a.txt", "ext-1");
        local.items = Some(vec![ObjectiveItem::new(local.id, local_item.clone())]);
        context.update(&mut local).unwrap();
        synced.items = Some(vec![ObjectiveItem::new(synced.id, synced_item.clone())]);
        context.update(&mut synced).unwrap();

        let mut remote = Objective::new(0, "Railing");
        let mut remote_item = Item::new("/a.txt");
        remote_item.external_id = Some("ext-1".into());
        remote.items = Some(vec![ObjectiveItem::new(0, remote_item)]);
        let mut tuple = SynchronizingTuple::new(
            context.load_objective_graph(local.id).map(|mut objective| {
                objective.items = Some(Vec::new());
                objective
            }),
            context.load_objective_graph(synced.id),
            Some(remote),
        )
        .unwrap();
        objective_items(&ItemMerger).merge(&mut context, &mut tuple).unwrap();

        assert!(tuple.remote_changed());
        assert_eq!(tuple.remote.unwrap().items, Some(Vec::new()));
        assert!(!context
            .links(LinkKind::ObjectiveItem)
            .contains(synced.id, synced_item.id));
        // still the mate of the local item
        assert!(context.get::<Item>(synced_item.id).is_some());
        assert!(context.verify_mates().is_ok());
    }

    #[test]
    fn bim_element_reuses_existing_row() {
        let mut context = Context::new();
        let (local, synced) = stored_objective_pair(&mut context);
        let mut element = BimElement::new("3cUkl32yn9qRSPvBJVyWYp", "Tower.ifc");
        context.add(&mut element);

        let mut remote = Objective::new(0, "Railing");
        remote.bim_elements = Some(vec![BimElementObjective::new(
            0,
            BimElement::new("3cUkl32yn9qRSPvBJVyWYp", "TOWER.IFC"),
        )]);
        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_bim_elements(&BimElementMerger)
            .merge(&mut context, &mut tuple)
            .unwrap();

        assert_eq!(context.count::<BimElement>(), 1);
        let linked = tuple.local.unwrap().bim_elements.unwrap();
        assert_eq!(linked[0].bim_element_id, element.id);
    }

    #[test]
    fn nested_fields_follow_remote() {
        let mut context = Context::new();
        let (local, synced) = stored_objective_pair(&mut context);

        let mut location = DynamicField::new("Location", FieldValue::Object);
        location.external_id = Some("ext-30".into());
        location.children = Some(vec![DynamicField::new("Floor", FieldValue::Integer(3))]);
        let mut remote = Objective::new(0, "Railing");
        remote.dynamic_fields = Some(vec![location]);

        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        objective_dynamic_fields(&DynamicFieldMerger::new(Some(4)))
            .merge(&mut context, &mut tuple)
            .unwrap();
        let mut local = tuple.local.unwrap();
        context.update(&mut local).unwrap();

        let fields = context.load_dynamic_fields(local.id);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].connection_info_id, Some(4));
        let nested = fields[0].children.as_ref().unwrap();
        assert_eq!(nested[0].value, FieldValue::Integer(3));
        assert!(context.verify_mates().is_ok());
    }

    #[test]
    fn objective_merger_runs_every_collection() {
        let mut context = Context::new();
        let (local, synced) = stored_objective_pair(&mut context);
        let mut remote = Objective::new(0, "Railing");
        remote.items = Some(vec![ObjectiveItem::new(0, Item::new("/plan.pdf"))]);
        remote.bim_elements = Some(vec![BimElementObjective::new(
            0,
            BimElement::new("0Dy0fYzBj6QPhyQz3IIc7T", "Tower.ifc"),
        )]);
        remote.dynamic_fields = Some(vec![DynamicField::new("Floor", FieldValue::Integer(2))]);

        let mut tuple = objective_tuple(&context, local.id, synced.id, remote);
        ObjectiveMerger::default().merge(&mut context, &mut tuple).unwrap();
        let local = tuple.local.unwrap();
        assert_eq!(local.items.unwrap().len(), 1);
        assert_eq!(local.bim_elements.unwrap().len(), 1);
        assert_eq!(local.dynamic_fields.unwrap().len(), 1);
    }
}
