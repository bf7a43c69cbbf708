//! How each entity type is stored in the unit of work

use super::{Context, LinkKind, Table};
use crate::models::{BimElement, DynamicField, Item, Objective, Project, User};

/// An entity type stored in a [`Context`] table.
///
/// Saving a record also saves the links described by its loaded child
/// collections: join rows are replaced by the collection, owned children get
/// the parent's foreign key and owned rows missing from the collection are
/// removed. Collections that are not loaded leave links untouched.
pub trait Record: Clone {
    /// Table name used in messages and by the libSQL store
    const TABLE: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn table(context: &Context) -> &Table<Self>;
    fn table_mut(context: &mut Context) -> &mut Table<Self>;

    /// The copy kept in the table, with child collections unloaded.
    #[must_use]
    fn stored(&self) -> Self {
        self.clone()
    }

    /// Persist the links described by loaded child collections.
    fn save_links(&mut self, _context: &mut Context) {}

    /// Remove links and owned rows of the record with the given id.
    fn remove_owned(_context: &mut Context, _id: i64) {}
}

impl Record for User {
    const TABLE: &'static str = "users";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn table(context: &Context) -> &Table<Self> {
        &context.users
    }

    fn table_mut(context: &mut Context) -> &mut Table<Self> {
        &mut context.users
    }

    fn remove_owned(context: &mut Context, id: i64) {
        for project_id in context.user_projects.children_of(id) {
            context.user_projects.unlink(id, project_id);
        }
    }
}

impl Record for Project {
    const TABLE: &'static str = "projects";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn table(context: &Context) -> &Table<Self> {
        &context.projects
    }

    fn table_mut(context: &mut Context) -> &mut Table<Self> {
        &mut context.projects
    }

    fn stored(&self) -> Self {
        Self {
            items: None,
            ..self.clone()
        }
    }

    fn save_links(&mut self, context: &mut Context) {
        let project_id = self.id;
        let Some(items) = self.items.as_mut() else {
            return;
        };

        let mut kept = Vec::with_capacity(items.len());
        for item in items.iter_mut() {
            item.project_id = Some(project_id);
            if item.id != 0 {
                context
                    .items
                    .modify(item.id, |row| row.project_id = Some(project_id));
                kept.push(item.id);
            }
        }

        let released = context
            .items
            .rows()
            .filter(|row| row.project_id == Some(project_id) && !kept.contains(&row.id))
            .map(|row| row.id)
            .collect::<Vec<_>>();
        for item_id in released {
            context.items.modify(item_id, |row| row.project_id = None);
        }
    }

    fn remove_owned(context: &mut Context, id: i64) {
        for user_id in context.user_projects.parents_of(id) {
            context.user_projects.unlink(user_id, id);
        }
        let owned = context
            .items
            .rows()
            .filter(|row| row.project_id == Some(id))
            .map(|row| row.id)
            .collect::<Vec<_>>();
        for item_id in owned {
            context.items.modify(item_id, |row| row.project_id = None);
        }
    }
}

impl Record for Objective {
    const TABLE: &'static str = "objectives";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn table(context: &Context) -> &Table<Self> {
        &context.objectives
    }

    fn table_mut(context: &mut Context) -> &mut Table<Self> {
        &mut context.objectives
    }

    fn stored(&self) -> Self {
        let mut stored = self.clone();
        stored.unload_children();
        stored.project_external_id = None;
        stored.parent_external_id = None;
        stored
    }

    fn save_links(&mut self, context: &mut Context) {
        let objective_id = self.id;

        if let Some(items) = self.items.as_mut() {
            for link in items.iter_mut() {
                link.objective_id = objective_id;
                link.item_id = link.item.id;
            }
            let ids = items
                .iter()
                .map(|link| link.item_id)
                .filter(|id| *id != 0)
                .collect::<Vec<_>>();
            context
                .links_mut(LinkKind::ObjectiveItem)
                .replace_children(objective_id, &ids);
        }

        if let Some(elements) = self.bim_elements.as_mut() {
            for link in elements.iter_mut() {
                link.objective_id = objective_id;
                link.bim_element_id = link.bim_element.id;
            }
            let ids = elements
                .iter()
                .map(|link| link.bim_element_id)
                .filter(|id| *id != 0)
                .collect::<Vec<_>>();
            context
                .links_mut(LinkKind::BimElementObjective)
                .replace_children(objective_id, &ids);
        }

        if let Some(fields) = self.dynamic_fields.as_mut() {
            let mut kept = Vec::with_capacity(fields.len());
            for field in fields.iter_mut() {
                field.objective_id = Some(objective_id);
                field.parent_field_id = None;
                if field.id != 0 {
                    context.dynamic_fields.modify(field.id, |row| {
                        row.objective_id = Some(objective_id);
                        row.parent_field_id = None;
                    });
                    kept.push(field.id);
                }
                field.save_links(context);
            }
            let orphaned = context
                .dynamic_fields
                .rows()
                .filter(|row| {
                    row.objective_id == Some(objective_id)
                        && row.parent_field_id.is_none()
                        && !kept.contains(&row.id)
                })
                .map(|row| row.id)
                .collect::<Vec<_>>();
            for field_id in orphaned {
                context.remove::<DynamicField>(field_id);
            }
        }
    }

    fn remove_owned(context: &mut Context, id: i64) {
        context.objective_items.remove_parent(id);
        context.bim_element_objectives.remove_parent(id);

        let fields = context
            .dynamic_fields
            .rows()
            .filter(|row| row.objective_id == Some(id) && row.parent_field_id.is_none())
            .map(|row| row.id)
            .collect::<Vec<_>>();
        for field_id in fields {
            context.remove::<DynamicField>(field_id);
        }

        let children = context
            .objectives
            .rows()
            .filter(|row| row.parent_objective_id == Some(id))
            .map(|row| row.id)
            .collect::<Vec<_>>();
        for child_id in children {
            context
                .objectives
                .modify(child_id, |row| row.parent_objective_id = None);
        }
    }
}

impl Record for Item {
    const TABLE: &'static str = "items";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn table(context: &Context) -> &Table<Self> {
        &context.items
    }

    fn table_mut(context: &mut Context) -> &mut Table<Self> {
        &mut context.items
    }

    fn remove_owned(context: &mut Context, id: i64) {
        context.objective_items.remove_child(id);
    }
}

impl Record for BimElement {
    const TABLE: &'static str = "bim_elements";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn table(context: &Context) -> &Table<Self> {
        &context.bim_elements
    }

    fn table_mut(context: &mut Context) -> &mut Table<Self> {
        &mut context.bim_elements
    }

    fn remove_owned(context: &mut Context, id: i64) {
        context.bim_element_objectives.remove_child(id);
    }
}

impl Record for DynamicField {
    const TABLE: &'static str = "dynamic_fields";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn table(context: &Context) -> &Table<Self> {
        &context.dynamic_fields
    }

    fn table_mut(context: &mut Context) -> &mut Table<Self> {
        &mut context.dynamic_fields
    }

    fn stored(&self) -> Self {
        Self {
            children: None,
            ..self.clone()
        }
    }

    fn save_links(&mut self, context: &mut Context) {
        let parent_id = self.id;
        if parent_id == 0 {
            return;
        }
        let Some(children) = self.children.as_mut() else {
            return;
        };

        let mut kept = Vec::with_capacity(children.len());
        for child in children.iter_mut() {
            child.parent_field_id = Some(parent_id);
            child.objective_id = None;
            if child.id != 0 {
                context.dynamic_fields.modify(child.id, |row| {
                    row.parent_field_id = Some(parent_id);
                    row.objective_id = None;
                });
                kept.push(child.id);
            }
            child.save_links(context);
        }

        let orphaned = context
            .dynamic_fields
            .rows()
            .filter(|row| row.parent_field_id == Some(parent_id) && !kept.contains(&row.id))
            .map(|row| row.id)
            .collect::<Vec<_>>();
        for field_id in orphaned {
            context.remove::<Self>(field_id);
        }
    }

    fn remove_owned(context: &mut Context, id: i64) {
        let nested = context
            .dynamic_fields
            .rows()
            .filter(|row| row.parent_field_id == Some(id))
            .map(|row| row.id)
            .collect::<Vec<_>>();
        for field_id in nested {
            context.remove::<Self>(field_id);
        }
    }
}
