//! Unit of work for the local store
//!
//! A [`Context`] holds every row of the local store in change-tracked
//! tables. The synchronization engine stages additions, updates and removals
//! against it; nothing is written to disk until the caller hands the context
//! to a [`ChangeSink`]. Adding a row assigns its id immediately so that mate
//! references and links can be set while a run is in progress.

mod records;
mod table;

pub use records::Record;
pub use table::{LinkChanges, LinkTable, Table, TableChanges};

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{
    BimElement, BimElementObjective, DynamicField, Item, Objective, ObjectiveItem, Project,
    Synchronizable, User,
};

/// Join tables held by the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    UserProject,
    ObjectiveItem,
    BimElementObjective,
}

/// Change-tracked persistence context shared by one synchronization run
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub(crate) users: Table<User>,
    pub(crate) projects: Table<Project>,
    pub(crate) objectives: Table<Objective>,
    pub(crate) items: Table<Item>,
    pub(crate) bim_elements: Table<BimElement>,
    pub(crate) dynamic_fields: Table<DynamicField>,
    pub(crate) user_projects: LinkTable,
    pub(crate) objective_items: LinkTable,
    pub(crate) bim_element_objectives: LinkTable,
}

/// Every staged change of a context, drained by [`Context::take_changes`]
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub users: TableChanges<User>,
    pub projects: TableChanges<Project>,
    pub objectives: TableChanges<Objective>,
    pub items: TableChanges<Item>,
    pub bim_elements: TableChanges<BimElement>,
    pub dynamic_fields: TableChanges<DynamicField>,
    pub user_projects: LinkChanges,
    pub objective_items: LinkChanges,
    pub bim_element_objectives: LinkChanges,
}

/// Destination for the staged changes of a context
#[allow(async_fn_in_trait)]
pub trait ChangeSink {
    /// Persist everything staged in `context` and mark it clean.
    async fn commit(&self, context: &mut Context) -> Result<()>;
}

/// Sink that keeps committed changes in memory only
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemorySink;

impl ChangeSink for InMemorySink {
    async fn commit(&self, context: &mut Context) -> Result<()> {
        let changes = context.take_changes();
        tracing::debug!(
            projects = changes.projects.upserted.len(),
            objectives = changes.objectives.upserted.len(),
            "Committed changes in memory"
        );
        Ok(())
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new row and persist the links of its loaded child collections.
    ///
    /// Returns the assigned id, which is also written back into `row`.
    pub fn add<T: Record>(&mut self, row: &mut T) -> i64 {
        let id = T::table_mut(self).insert(row.stored());
        row.set_id(id);
        T::table_mut(self).modify(id, |stored| stored.set_id(id));
        row.save_links(self);
        id
    }

    /// Stage an update of an existing row and persist the links of its loaded
    /// child collections.
    pub fn update<T: Record>(&mut self, row: &mut T) -> Result<()> {
        let id = row.id();
        if id == 0 {
            return Err(Error::Invariant(format!(
                "cannot update an unsaved {} row",
                T::TABLE
            )));
        }
        if !T::table_mut(self).put(id, row.stored()) {
            return Err(Error::NotFound(format!("{} #{id}", T::TABLE)));
        }
        row.save_links(self);
        Ok(())
    }

    /// Stage the removal of a row and of everything it owns.
    pub fn remove<T: Record>(&mut self, id: i64) -> Option<T> {
        if !T::table(self).contains(id) {
            return None;
        }
        T::remove_owned(self, id);
        T::table_mut(self).delete(id)
    }

    pub fn get<T: Record>(&self, id: i64) -> Option<&T> {
        T::table(self).get(id)
    }

    pub fn find<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        T::table(self).rows().find(|row| predicate(*row))
    }

    pub fn filter<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        T::table(self)
            .rows()
            .filter(|row| predicate(*row))
            .cloned()
            .collect()
    }

    pub fn rows<'a, T: Record + 'a>(&'a self) -> impl Iterator<Item = &'a T> + 'a {
        T::table(self).rows()
    }

    pub fn count<T: Record>(&self) -> usize {
        T::table(self).len()
    }

    /// Synchronized-baseline row paired with a local row.
    pub fn mate_of<T: Record + Synchronizable>(&self, local: &T) -> Option<&T> {
        local
            .synchronization_mate_id()
            .and_then(|mate_id| self.get::<T>(mate_id))
    }

    /// Local row paired with a synchronized-baseline row.
    pub fn local_of<T: Record + Synchronizable>(&self, synchronized: &T) -> Option<&T> {
        let id = synchronized.id();
        self.find::<T>(|row| !row.is_synchronized() && row.synchronization_mate_id() == Some(id))
    }

    /// Synchronized-baseline row carrying the given external id.
    pub fn synchronized_by_external_id<T: Record + Synchronizable>(
        &self,
        external_id: &str,
    ) -> Option<&T> {
        self.find::<T>(|row| row.is_synchronized() && row.external_id() == Some(external_id))
    }

    pub fn links(&self, kind: LinkKind) -> &LinkTable {
        match kind {
            LinkKind::UserProject => &self.user_projects,
            LinkKind::ObjectiveItem => &self.objective_items,
            LinkKind::BimElementObjective => &self.bim_element_objectives,
        }
    }

    pub(crate) fn links_mut(&mut self, kind: LinkKind) -> &mut LinkTable {
        match kind {
            LinkKind::UserProject => &mut self.user_projects,
            LinkKind::ObjectiveItem => &mut self.objective_items,
            LinkKind::BimElementObjective => &mut self.bim_element_objectives,
        }
    }

    /// Stage a join record. Returns `false` when it already existed.
    pub fn link(&mut self, kind: LinkKind, parent: i64, child: i64) -> bool {
        self.links_mut(kind).link(parent, child)
    }

    /// Stage the removal of a join record. Returns `false` when it did not exist.
    pub fn unlink(&mut self, kind: LinkKind, parent: i64, child: i64) -> bool {
        self.links_mut(kind).unlink(parent, child)
    }

    /// Items owned by a project.
    pub fn load_project_items(&self, project_id: i64) -> Vec<Item> {
        self.filter::<Item>(|item| item.project_id == Some(project_id))
    }

    /// Item links of an objective with the items attached.
    pub fn load_objective_items(&self, objective_id: i64) -> Vec<ObjectiveItem> {
        self.objective_items
            .children_of(objective_id)
            .into_iter()
            .filter_map(|item_id| self.items.get(item_id))
            .map(|item| ObjectiveItem::new(objective_id, item.clone()))
            .collect()
    }

    /// BIM element links of an objective with the elements attached.
    pub fn load_bim_elements(&self, objective_id: i64) -> Vec<BimElementObjective> {
        self.bim_element_objectives
            .children_of(objective_id)
            .into_iter()
            .filter_map(|element_id| self.bim_elements.get(element_id))
            .map(|element| BimElementObjective::new(objective_id, element.clone()))
            .collect()
    }

    /// Top-level dynamic fields of an objective, nested fields loaded.
    pub fn load_dynamic_fields(&self, objective_id: i64) -> Vec<DynamicField> {
        self.dynamic_fields
            .rows()
            .filter(|field| field.objective_id == Some(objective_id) && field.parent_field_id.is_none())
            .map(|field| self.with_nested_fields(field.clone()))
            .collect()
    }

    /// Nested fields of an object-typed field, recursively loaded.
    pub fn load_nested_fields(&self, parent_field_id: i64) -> Vec<DynamicField> {
        self.dynamic_fields
            .rows()
            .filter(|field| field.parent_field_id == Some(parent_field_id))
            .map(|field| self.with_nested_fields(field.clone()))
            .collect()
    }

    fn with_nested_fields(&self, mut field: DynamicField) -> DynamicField {
        field.children = Some(self.load_nested_fields(field.id));
        field
    }

    /// A project with its items loaded.
    pub fn load_project_graph(&self, project_id: i64) -> Option<Project> {
        let mut project = self.get::<Project>(project_id)?.clone();
        project.items = Some(self.load_project_items(project_id));
        Some(project)
    }

    /// An objective with every child collection loaded and its link keys resolved.
    pub fn load_objective_graph(&self, objective_id: i64) -> Option<Objective> {
        let mut objective = self.get::<Objective>(objective_id)?.clone();
        objective.items = Some(self.load_objective_items(objective_id));
        objective.bim_elements = Some(self.load_bim_elements(objective_id));
        objective.dynamic_fields = Some(self.load_dynamic_fields(objective_id));
        objective.project_external_id = self
            .get::<Project>(objective.project_id)
            .and_then(|project| self.external_id_through_mate(project));
        objective.parent_external_id = objective
            .parent_objective_id
            .and_then(|parent_id| self.get::<Objective>(parent_id))
            .and_then(|parent| self.external_id_through_mate(parent));
        Some(objective)
    }

    /// External id of a row, falling back to its synchronized mate's.
    pub fn external_id_through_mate<T: Record + Synchronizable>(&self, row: &T) -> Option<String> {
        row.external_id()
            .map(str::to_string)
            .or_else(|| self.mate_of(row).and_then(|mate| mate.external_id().map(str::to_string)))
    }

    /// Objectives linking the given item.
    pub fn objectives_linking_item(&self, item_id: i64) -> Vec<i64> {
        self.objective_items.parents_of(item_id)
    }

    /// Objectives linking the given BIM element.
    pub fn objectives_linking_bim_element(&self, element_id: i64) -> Vec<i64> {
        self.bim_element_objectives.parents_of(element_id)
    }

    /// Check the mate invariant: a mate reference points at an existing
    /// synchronized row, only local rows carry one, and no two local rows
    /// share a mate.
    pub fn verify_mates(&self) -> Result<()> {
        verify_table_mates(&self.projects)?;
        verify_table_mates(&self.objectives)?;
        verify_table_mates(&self.items)?;
        verify_table_mates(&self.dynamic_fields)
    }

    pub fn has_changes(&self) -> bool {
        self.users.has_changes()
            || self.projects.has_changes()
            || self.objectives.has_changes()
            || self.items.has_changes()
            || self.bim_elements.has_changes()
            || self.dynamic_fields.has_changes()
            || self.user_projects.has_changes()
            || self.objective_items.has_changes()
            || self.bim_element_objectives.has_changes()
    }

    /// Every staged change, without clearing it.
    pub fn staged_changes(&self) -> ChangeSet {
        ChangeSet {
            users: self.users.staged_changes(),
            projects: self.projects.staged_changes(),
            objectives: self.objectives.staged_changes(),
            items: self.items.staged_changes(),
            bim_elements: self.bim_elements.staged_changes(),
            dynamic_fields: self.dynamic_fields.staged_changes(),
            user_projects: self.user_projects.staged_changes(),
            objective_items: self.objective_items.staged_changes(),
            bim_element_objectives: self.bim_element_objectives.staged_changes(),
        }
    }

    /// Forget staged changes once they are persisted.
    pub fn mark_clean(&mut self) {
        self.users.clear_changes();
        self.projects.clear_changes();
        self.objectives.clear_changes();
        self.items.clear_changes();
        self.bim_elements.clear_changes();
        self.dynamic_fields.clear_changes();
        self.user_projects.clear_changes();
        self.objective_items.clear_changes();
        self.bim_element_objectives.clear_changes();
    }

    /// Drain every staged change, leaving the context clean.
    pub fn take_changes(&mut self) -> ChangeSet {
        let changes = self.staged_changes();
        self.mark_clean();
        changes
    }

    /// Start journaling so that [`Context::rollback`] can undo every change
    /// made from here on. Replaces an earlier checkpoint.
    pub fn checkpoint(&mut self) {
        self.users.checkpoint();
        self.projects.checkpoint();
        self.objectives.checkpoint();
        self.items.checkpoint();
        self.bim_elements.checkpoint();
        self.dynamic_fields.checkpoint();
        self.user_projects.checkpoint();
        self.objective_items.checkpoint();
        self.bim_element_objectives.checkpoint();
    }

    /// Undo every change made since the last checkpoint.
    pub fn rollback(&mut self) {
        self.users.rollback();
        self.projects.rollback();
        self.objectives.rollback();
        self.items.rollback();
        self.bim_elements.rollback();
        self.dynamic_fields.rollback();
        self.user_projects.rollback();
        self.objective_items.rollback();
        self.bim_element_objectives.rollback();
    }

    /// Keep the changes made since the last checkpoint.
    pub fn release(&mut self) {
        self.users.release();
        self.projects.release();
        self.objectives.release();
        self.items.release();
        self.bim_elements.release();
        self.dynamic_fields.release();
        self.user_projects.release();
        self.objective_items.release();
        self.bim_element_objectives.release();
    }

    /// Load a row read from storage without staging it.
    pub(crate) fn hydrate<T: Record>(&mut self, row: T) {
        let id = row.id();
        T::table_mut(self).hydrate(id, row);
    }

    /// Load a join record read from storage without staging it.
    pub(crate) fn hydrate_link(&mut self, kind: LinkKind, parent: i64, child: i64) {
        self.links_mut(kind).hydrate(parent, child);
    }
}

fn verify_table_mates<T: Record + Synchronizable>(table: &Table<T>) -> Result<()> {
    let mut seen: HashMap<i64, i64> = HashMap::new();
    for row in table.rows() {
        let Some(mate_id) = row.synchronization_mate_id() else {
            continue;
        };
        if row.is_synchronized() {
            return Err(Error::Invariant(format!(
                "synchronized {} #{} carries a mate reference",
                T::TABLE,
                row.id()
            )));
        }
        match table.get(mate_id) {
            Some(mate) if mate.is_synchronized() => {}
            Some(_) => {
                return Err(Error::Invariant(format!(
                    "{} #{} is mated to local row #{mate_id}",
                    T::TABLE,
                    row.id()
                )))
            }
            None => {
                return Err(Error::Invariant(format!(
                    "{} #{} is mated to missing row #{mate_id}",
                    T::TABLE,
                    row.id()
                )))
            }
        }
        if let Some(other) = seen.insert(mate_id, row.id()) {
            return Err(Error::Invariant(format!(
                "{} #{} and #{other} share mate #{mate_id}",
                T::TABLE,
                row.id()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn synced_pair(ctx: &mut Context, title: &str) -> (Project, Project) {
        let mut synced = Project::new(title);
        synced.is_synchronized = true;
        synced.external_id = Some(format!("ext-{title}"));
        ctx.add(&mut synced);
        let mut local = Project::new(title);
        local.synchronization_mate_id = Some(synced.id);
        ctx.add(&mut local);
        (local, synced)
    }

    #[test]
    fn test_add_assigns_id() {
        let mut ctx = Context::new();
        let mut project = Project::new("Tower A");
        let id = ctx.add(&mut project);
        assert_eq!(project.id, id);
        assert_eq!(ctx.get::<Project>(id).unwrap().id, id);
        assert!(ctx.has_changes());
    }

    #[test]
    fn test_stored_rows_have_unloaded_children() {
        let mut ctx = Context::new();
        let mut project = Project::new("Tower A");
        ctx.add(&mut project);
        assert_eq!(ctx.get::<Project>(project.id).unwrap().items, None);
    }

    #[test]
    fn test_update_unsaved_row_is_invariant_error() {
        let mut ctx = Context::new();
        let mut project = Project::new("Tower A");
        assert!(matches!(ctx.update(&mut project), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_project_items_follow_loaded_collection() {
        let mut ctx = Context::new();
        let mut item = Item::new("/a.txt");
        ctx.add(&mut item);
        let mut project = Project::new("Tower A");
        project.items = Some(vec![item.clone()]);
        ctx.add(&mut project);
        assert_eq!(ctx.load_project_items(project.id).len(), 1);

        project.items = Some(Vec::new());
        ctx.update(&mut project).unwrap();
        assert!(ctx.load_project_items(project.id).is_empty());
        assert!(ctx.get::<Item>(item.id).is_some());
    }

    #[test]
    fn test_objective_graph_round_trip() {
        let mut ctx = Context::new();
        let (project, _) = synced_pair(&mut ctx, "tower");
        let mut item = Item::new("/a.txt");
        ctx.add(&mut item);
        let mut floor = DynamicField::new("Floor", FieldValue::Integer(2));
        ctx.add(&mut floor);
        let mut location = DynamicField::new("Location", FieldValue::Object);
        location.children = Some(vec![floor.clone()]);
        ctx.add(&mut location);

        let mut objective = Objective::new(project.id, "Fix façade");
        objective.items = Some(vec![ObjectiveItem::new(0, item.clone())]);
        objective.dynamic_fields = Some(vec![location.clone()]);
        ctx.add(&mut objective);

        let loaded = ctx.load_objective_graph(objective.id).unwrap();
        assert_eq!(loaded.items.as_ref().unwrap().len(), 1);
        assert_eq!(loaded.project_external_id.as_deref(), Some("ext-tower"));
        let fields = loaded.dynamic_fields.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].children.as_ref().unwrap()[0].name, "Floor");
    }

    #[test]
    fn test_remove_objective_cascades_links_and_fields() {
        let mut ctx = Context::new();
        let mut item = Item::new("/a.txt");
        ctx.add(&mut item);
        let mut field = DynamicField::new("Floor", FieldValue::Integer(2));
        ctx.add(&mut field);
        let mut objective = Objective::new(1, "Fix façade");
        objective.items = Some(vec![ObjectiveItem::new(0, item.clone())]);
        objective.dynamic_fields = Some(vec![field.clone()]);
        ctx.add(&mut objective);

        ctx.remove::<Objective>(objective.id);
        assert!(ctx.objectives_linking_item(item.id).is_empty());
        assert!(ctx.get::<DynamicField>(field.id).is_none());
        assert!(ctx.get::<Item>(item.id).is_some());
    }

    #[test]
    fn test_verify_mates_accepts_pairs() {
        let mut ctx = Context::new();
        synced_pair(&mut ctx, "a");
        synced_pair(&mut ctx, "b");
        assert!(ctx.verify_mates().is_ok());
    }

    #[test]
    fn test_verify_mates_rejects_shared_mate() {
        let mut ctx = Context::new();
        let (_, synced) = synced_pair(&mut ctx, "a");
        let mut intruder = Project::new("intruder");
        intruder.synchronization_mate_id = Some(synced.id);
        ctx.add(&mut intruder);
        assert!(matches!(ctx.verify_mates(), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_verify_mates_rejects_mate_to_local_row() {
        let mut ctx = Context::new();
        let mut other = Project::new("other");
        ctx.add(&mut other);
        let mut local = Project::new("local");
        local.synchronization_mate_id = Some(other.id);
        ctx.add(&mut local);
        assert!(matches!(ctx.verify_mates(), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_take_changes_leaves_context_clean() {
        let mut ctx = Context::new();
        synced_pair(&mut ctx, "a");
        let changes = ctx.take_changes();
        assert_eq!(changes.projects.upserted.len(), 2);
        assert!(!ctx.has_changes());
    }

    #[test]
    fn test_rollback_undoes_cascading_removal() {
        let mut ctx = Context::new();
        let mut project = Project::new("Tower");
        ctx.add(&mut project);
        let mut item = Item::new("/a.txt");
        ctx.add(&mut item);
        let mut field = DynamicField::new("Floor", FieldValue::Integer(2));
        ctx.add(&mut field);
        let mut objective = Objective::new(project.id, "Railing");
        objective.items = Some(vec![ObjectiveItem::new(0, item.clone())]);
        objective.dynamic_fields = Some(vec![field]);
        ctx.add(&mut objective);
        ctx.mark_clean();

        ctx.checkpoint();
        ctx.remove::<Objective>(objective.id);
        ctx.add(&mut Project::new("Annex"));
        assert!(ctx.has_changes());
        ctx.rollback();

        assert!(!ctx.has_changes());
        assert_eq!(ctx.count::<Project>(), 1);
        let graph = ctx.load_objective_graph(objective.id).unwrap();
        assert_eq!(graph.items.unwrap()[0].item.id, item.id);
        assert_eq!(graph.dynamic_fields.unwrap().len(), 1);
        assert_eq!(ctx.add(&mut Project::new("Annex")), project.id + 1);
    }
}
