//! libSQL-backed store for the unit of work
//!
//! [`LibSqlStore::load`] reads every table into a fresh [`Context`];
//! [`LibSqlStore`] as a [`ChangeSink`] writes the context's staged changes
//! back in one transaction.

use libsql::{Connection, Row, Value};

use crate::context::{ChangeSet, ChangeSink, Context, LinkChanges, LinkKind};
use crate::error::Result;
use crate::models::{
    BimElement, DynamicField, FieldKind, FieldValue, Item, ItemType, Objective, ObjectiveStatus,
    Project, User,
};

/// libSQL implementation of the local store
pub struct LibSqlStore<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Load every row into a new unit of work.
    ///
    /// Fails when the stored mate references break the pairing invariant.
    pub async fn load(&self) -> Result<Context> {
        let mut context = Context::new();

        for user in self.query_rows("SELECT id, login, name FROM users", parse_user).await? {
            context.hydrate(user);
        }
        for project in self
            .query_rows(
                "SELECT id, external_id, title, synchronization_mate_id, is_synchronized, updated_at
                 FROM projects",
                parse_project,
            )
            .await?
        {
            context.hydrate(project);
        }
        for objective in self
            .query_rows(
                "SELECT id, external_id, project_id, parent_objective_id, title, description, status,
                        creation_date, due_date, objective_type, author_external_id,
                        synchronization_mate_id, is_synchronized, updated_at
                 FROM objectives",
                parse_objective,
            )
            .await?
        {
            context.hydrate(objective);
        }
        for item in self
            .query_rows(
                "SELECT id, external_id, relative_path, name, item_type, project_id,
                        synchronization_mate_id, is_synchronized, updated_at
                 FROM items",
                parse_item,
            )
            .await?
        {
            context.hydrate(item);
        }
        for element in self
            .query_rows(
                "SELECT id, global_id, parent_name, element_name, element_type FROM bim_elements",
                parse_bim_element,
            )
            .await?
        {
            context.hydrate(element);
        }
        let mut rows = self
            .conn
            .query(
                "SELECT id, external_id, name, kind, value, objective_id, parent_field_id,
                        connection_info_id, synchronization_mate_id, is_synchronized, updated_at
                 FROM dynamic_fields",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            context.hydrate(parse_dynamic_field(&row)?);
        }

        for (kind, sql) in [
            (
                LinkKind::UserProject,
                "SELECT user_id, project_id FROM user_projects",
            ),
            (
                LinkKind::ObjectiveItem,
                "SELECT objective_id, item_id FROM objective_items",
            ),
            (
                LinkKind::BimElementObjective,
                "SELECT objective_id, bim_element_id FROM bim_element_objectives",
            ),
        ] {
            let mut rows = self.conn.query(sql, ()).await?;
            while let Some(row) = rows.next().await? {
                context.hydrate_link(kind, row.get(0)?, row.get(1)?);
            }
        }

        context.verify_mates()?;
        tracing::debug!(
            projects = context.count::<Project>(),
            objectives = context.count::<Objective>(),
            items = context.count::<Item>(),
            "Loaded local store"
        );
        Ok(context)
    }

    async fn query_rows<T>(
        &self,
        sql: &str,
        parse: fn(&Row) -> libsql::Result<T>,
    ) -> Result<Vec<T>> {
        let mut rows = self.conn.query(sql, ()).await?;
        let mut parsed = Vec::new();
        while let Some(row) = rows.next().await? {
            parsed.push(parse(&row)?);
        }
        Ok(parsed)
    }

    async fn write(&self, changes: &ChangeSet) -> Result<()> {
        self.delete_links("user_projects", "user_id", "project_id", &changes.user_projects)
            .await?;
        self.delete_links("objective_items", "objective_id", "item_id", &changes.objective_items)
            .await?;
        self.delete_links(
            "bim_element_objectives",
            "objective_id",
            "bim_element_id",
            &changes.bim_element_objectives,
        )
        .await?;

        self.delete_rows("dynamic_fields", &changes.dynamic_fields.removed)
            .await?;
        self.delete_rows("objectives", &changes.objectives.removed)
            .await?;
        self.delete_rows("items", &changes.items.removed).await?;
        self.delete_rows("bim_elements", &changes.bim_elements.removed)
            .await?;
        self.delete_rows("projects", &changes.projects.removed)
            .await?;
        self.delete_rows("users", &changes.users.removed).await?;

        for user in &changes.users.upserted {
            self.conn
                .execute(
                    "INSERT INTO users (id, login, name) VALUES (?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET login = excluded.login, name = excluded.name",
                    libsql::params![user.id, user.login.clone(), user.name.clone()],
                )
                .await?;
        }

        for project in &changes.projects.upserted {
            self.conn
                .execute(
                    "INSERT INTO projects (id, external_id, title, synchronization_mate_id, is_synchronized, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        external_id = excluded.external_id,
                        title = excluded.title,
                        synchronization_mate_id = excluded.synchronization_mate_id,
                        is_synchronized = excluded.is_synchronized,
                        updated_at = excluded.updated_at",
                    libsql::params![
                        project.id,
                        text_or_null(project.external_id.as_deref()),
                        project.title.clone(),
                        integer_or_null(project.synchronization_mate_id),
                        i64::from(project.is_synchronized),
                        project.updated_at,
                    ],
                )
                .await?;
        }

        for item in &changes.items.upserted {
            self.conn
                .execute(
                    "INSERT INTO items (id, external_id, relative_path, name, item_type, project_id,
                                        synchronization_mate_id, is_synchronized, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        external_id = excluded.external_id,
                        relative_path = excluded.relative_path,
                        name = excluded.name,
                        item_type = excluded.item_type,
                        project_id = excluded.project_id,
                        synchronization_mate_id = excluded.synchronization_mate_id,
                        is_synchronized = excluded.is_synchronized,
                        updated_at = excluded.updated_at",
                    libsql::params![
                        item.id,
                        text_or_null(item.external_id.as_deref()),
                        item.relative_path.clone(),
                        item.name.clone(),
                        item.item_type.as_i64(),
                        integer_or_null(item.project_id),
                        integer_or_null(item.synchronization_mate_id),
                        i64::from(item.is_synchronized),
                        item.updated_at,
                    ],
                )
                .await?;
        }

        for element in &changes.bim_elements.upserted {
            self.conn
                .execute(
                    "INSERT INTO bim_elements (id, global_id, parent_name, element_name, element_type)
                     VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        global_id = excluded.global_id,
                        parent_name = excluded.parent_name,
                        element_name = excluded.element_name,
                        element_type = excluded.element_type",
                    libsql::params![
                        element.id,
                        element.global_id.clone(),
                        element.parent_name.clone(),
                        element.element_name.clone(),
                        element.element_type.clone(),
                    ],
                )
                .await?;
        }

        for objective in &changes.objectives.upserted {
            self.conn
                .execute(
                    "INSERT INTO objectives (id, external_id, project_id, parent_objective_id, title,
                                             description, status, creation_date, due_date, objective_type,
                                             author_external_id, synchronization_mate_id, is_synchronized,
                                             updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        external_id = excluded.external_id,
                        project_id = excluded.project_id,
                        parent_objective_id = excluded.parent_objective_id,
                        title = excluded.title,
                        description = excluded.description,
                        status = excluded.status,
                        creation_date = excluded.creation_date,
                        due_date = excluded.due_date,
                        objective_type = excluded.objective_type,
                        author_external_id = excluded.author_external_id,
                        synchronization_mate_id = excluded.synchronization_mate_id,
                        is_synchronized = excluded.is_synchronized,
                        updated_at = excluded.updated_at",
                    libsql::params![
                        objective.id,
                        text_or_null(objective.external_id.as_deref()),
                        objective.project_id,
                        integer_or_null(objective.parent_objective_id),
                        objective.title.clone(),
                        objective.description.clone(),
                        objective.status.as_i64(),
                        objective.creation_date,
                        objective.due_date,
                        objective.objective_type.clone(),
                        text_or_null(objective.author_external_id.as_deref()),
                        integer_or_null(objective.synchronization_mate_id),
                        i64::from(objective.is_synchronized),
                        objective.updated_at,
                    ],
                )
                .await?;
        }

        for field in &changes.dynamic_fields.upserted {
            let (kind, value) = field.value.encode();
            self.conn
                .execute(
                    "INSERT INTO dynamic_fields (id, external_id, name, kind, value, objective_id,
                                                 parent_field_id, connection_info_id,
                                                 synchronization_mate_id, is_synchronized, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        external_id = excluded.external_id,
                        name = excluded.name,
                        kind = excluded.kind,
                        value = excluded.value,
                        objective_id = excluded.objective_id,
                        parent_field_id = excluded.parent_field_id,
                        connection_info_id = excluded.connection_info_id,
                        synchronization_mate_id = excluded.synchronization_mate_id,
                        is_synchronized = excluded.is_synchronized,
                        updated_at = excluded.updated_at",
                    libsql::params![
                        field.id,
                        text_or_null(field.external_id.as_deref()),
                        field.name.clone(),
                        kind.as_str(),
                        value,
                        integer_or_null(field.objective_id),
                        integer_or_null(field.parent_field_id),
                        integer_or_null(field.connection_info_id),
                        integer_or_null(field.synchronization_mate_id),
                        i64::from(field.is_synchronized),
                        field.updated_at,
                    ],
                )
                .await?;
        }

        self.insert_links("user_projects", "user_id", "project_id", &changes.user_projects)
            .await?;
        self.insert_links("objective_items", "objective_id", "item_id", &changes.objective_items)
            .await?;
        self.insert_links(
            "bim_element_objectives",
            "objective_id",
            "bim_element_id",
            &changes.bim_element_objectives,
        )
        .await?;

        Ok(())
    }

    async fn delete_rows(&self, table: &str, ids: &[i64]) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE id = ?");
        for id in ids {
            self.conn.execute(&sql, libsql::params![*id]).await?;
        }
        Ok(())
    }

    async fn delete_links(
        &self,
        table: &str,
        parent_column: &str,
        child_column: &str,
        changes: &LinkChanges,
    ) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE {parent_column} = ? AND {child_column} = ?");
        for (parent, child) in &changes.removed {
            self.conn.execute(&sql, libsql::params![*parent, *child]).await?;
        }
        Ok(())
    }

    async fn insert_links(
        &self,
        table: &str,
        parent_column: &str,
        child_column: &str,
        changes: &LinkChanges,
    ) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {table} ({parent_column}, {child_column}) VALUES (?, ?)"
        );
        for (parent, child) in &changes.added {
            self.conn.execute(&sql, libsql::params![*parent, *child]).await?;
        }
        Ok(())
    }
}

impl ChangeSink for LibSqlStore<'_> {
    async fn commit(&self, context: &mut Context) -> Result<()> {
        if !context.has_changes() {
            return Ok(());
        }

        let changes = context.staged_changes();
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        self.conn
            .execute("PRAGMA defer_foreign_keys = ON", ())
            .await?;

        if let Err(e) = self.write(&changes).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        context.mark_clean();
        tracing::info!(
            projects = changes.projects.upserted.len(),
            objectives = changes.objectives.upserted.len(),
            items = changes.items.upserted.len(),
            dynamic_fields = changes.dynamic_fields.upserted.len(),
            "Committed synchronization changes"
        );
        Ok(())
    }
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn integer_or_null(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn optional_text(row: &Row, index: i32) -> libsql::Result<Option<String>> {
    Ok(match row.get_value(index)? {
        Value::Text(text) => Some(text),
        _ => None,
    })
}

fn optional_integer(row: &Row, index: i32) -> libsql::Result<Option<i64>> {
    Ok(match row.get_value(index)? {
        Value::Integer(value) => Some(value),
        _ => None,
    })
}

fn parse_user(row: &Row) -> libsql::Result<User> {
    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
        name: row.get(2)?,
    })
}

fn parse_project(row: &Row) -> libsql::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        external_id: optional_text(row, 1)?,
        title: row.get(2)?,
        synchronization_mate_id: optional_integer(row, 3)?,
        is_synchronized: row.get::<i64>(4)? != 0,
        updated_at: row.get(5)?,
        items: None,
    })
}

fn parse_objective(row: &Row) -> libsql::Result<Objective> {
    Ok(Objective {
        id: row.get(0)?,
        external_id: optional_text(row, 1)?,
        project_id: row.get(2)?,
        parent_objective_id: optional_integer(row, 3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        status: ObjectiveStatus::from_i64(row.get(6)?),
        creation_date: row.get(7)?,
        due_date: row.get(8)?,
        objective_type: row.get(9)?,
        author_external_id: optional_text(row, 10)?,
        synchronization_mate_id: optional_integer(row, 11)?,
        is_synchronized: row.get::<i64>(12)? != 0,
        updated_at: row.get(13)?,
        project_external_id: None,
        parent_external_id: None,
        items: None,
        bim_elements: None,
        dynamic_fields: None,
    })
}

fn parse_item(row: &Row) -> libsql::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        external_id: optional_text(row, 1)?,
        relative_path: row.get(2)?,
        name: row.get(3)?,
        item_type: ItemType::from_i64(row.get(4)?),
        project_id: optional_integer(row, 5)?,
        synchronization_mate_id: optional_integer(row, 6)?,
        is_synchronized: row.get::<i64>(7)? != 0,
        updated_at: row.get(8)?,
    })
}

fn parse_bim_element(row: &Row) -> libsql::Result<BimElement> {
    Ok(BimElement {
        id: row.get(0)?,
        global_id: row.get(1)?,
        parent_name: row.get(2)?,
        element_name: row.get(3)?,
        element_type: row.get(4)?,
    })
}

fn parse_dynamic_field(row: &Row) -> Result<DynamicField> {
    let kind: FieldKind = row.get::<String>(3)?.parse()?;
    let value = FieldValue::decode(kind, &row.get::<String>(4)?)?;
    Ok(DynamicField {
        id: row.get(0)?,
        external_id: optional_text(row, 1)?,
        name: row.get(2)?,
        value,
        objective_id: optional_integer(row, 5)?,
        parent_field_id: optional_integer(row, 6)?,
        connection_info_id: optional_integer(row, 7)?,
        synchronization_mate_id: optional_integer(row, 8)?,
        is_synchronized: row.get::<i64>(9)? != 0,
        updated_at: row.get(10)?,
        children: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{BimElementObjective, ObjectiveItem};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn seeded_context() -> (Context, Objective) {
        let mut context = Context::new();
        let mut user = User::new("jdoe", "Jane Doe");
        context.add(&mut user);

        let mut synced_project = Project::new("Tower A");
        synced_project.is_synchronized = true;
        synced_project.external_id = Some("ext-p1".into());
        context.add(&mut synced_project);
        let mut project = Project::new("Tower A");
        project.synchronization_mate_id = Some(synced_project.id);
        context.add(&mut project);
        context.link(LinkKind::UserProject, user.id, project.id);

        let mut item = Item::new("/plans/level-1.pdf");
        item.project_id = Some(project.id);
        context.add(&mut item);
        let mut element = BimElement::new("3cUkl32yn9qRSPvBJVyWw5", "Tower.ifc");
        context.add(&mut element);
        let mut floor = DynamicField::new("Floor", FieldValue::Integer(3));
        context.add(&mut floor);
        let mut location = DynamicField::new("Location", FieldValue::Object);
        location.children = Some(vec![floor]);
        context.add(&mut location);

        let mut objective = Objective::new(project.id, "Check railing");
        objective.items = Some(vec![ObjectiveItem::new(0, item)]);
        objective.bim_elements = Some(vec![BimElementObjective::new(0, element)]);
        objective.dynamic_fields = Some(vec![location]);
        context.add(&mut objective);
        (context, objective)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_then_load_restores_graph() {
        let db = setup().await;
        let store = LibSqlStore::new(db.connection());
        let (mut context, objective) = seeded_context();

        store.commit(&mut context).await.unwrap();
        assert!(!context.has_changes());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.count::<Project>(), 2);
        assert_eq!(loaded.count::<DynamicField>(), 2);
        let graph = loaded.load_objective_graph(objective.id).unwrap();
        assert_eq!(graph.title, "Check railing");
        assert_eq!(graph.project_external_id.as_deref(), Some("ext-p1"));
        assert_eq!(graph.items.unwrap()[0].item.relative_path, "/plans/level-1.pdf");
        assert_eq!(graph.bim_elements.unwrap().len(), 1);
        let fields = graph.dynamic_fields.unwrap();
        assert_eq!(fields[0].children.as_ref().unwrap()[0].value, FieldValue::Integer(3));
        assert_eq!(loaded.links(LinkKind::UserProject).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_applies_removals() {
        let db = setup().await;
        let store = LibSqlStore::new(db.connection());
        let (mut context, objective) = seeded_context();
        store.commit(&mut context).await.unwrap();

        let mut context = store.load().await.unwrap();
        context.remove::<Objective>(objective.id);
        store.commit(&mut context).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.get::<Objective>(objective.id).is_none());
        assert_eq!(loaded.count::<DynamicField>(), 0);
        assert!(loaded.links(LinkKind::ObjectiveItem).is_empty());
        assert_eq!(loaded.count::<Item>(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_without_changes_is_noop() {
        let db = setup().await;
        let store = LibSqlStore::new(db.connection());
        let mut context = Context::new();
        store.commit(&mut context).await.unwrap();
        assert_eq!(store.load().await.unwrap().count::<Project>(), 0);
    }
}
