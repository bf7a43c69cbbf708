//! One synchronization run over a connection
//!
//! Projects are reconciled first, then objectives, so that every objective
//! can resolve its project. Tuples are handled one at a time against the
//! shared context, which is committed through a [`ChangeSink`] every
//! `commit_batch_size` root entities, at the end of the run and when the run
//! is cancelled.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::entity::{tuple_external_id, SyncEntity};
use super::matcher::{build_tuples, no_natural_key};
use super::result::SynchronizingResult;
use super::strategy::{ObjectiveStrategy, ProjectStrategy, SynchronizationStrategy};
use super::tuple::{ObjectType, SynchronizingAction, SynchronizingTuple};
use crate::config::{FailurePolicy, SynchronizationConfig};
use crate::context::{ChangeSink, Context};
use crate::error::{Error, Result};
use crate::models::{Objective, Project, User};
use crate::remote::mapping::{objective_from_dto, project_from_dto};
use crate::remote::{ConnectionContext, RemoteSynchronizer};
use crate::util::compact_text;

/// An entity whose synchronization failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub external_id: Option<String>,
    pub label: String,
    pub side: ObjectType,
    pub message: String,
}

/// Per-action counts of one root entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub unchanged: usize,
    pub added_locally: usize,
    pub added_remotely: usize,
    pub merged: usize,
    pub removed_locally: usize,
    pub removed_remotely: usize,
    pub failures: Vec<FailureRecord>,
}

impl EntityReport {
    fn tally(&mut self, action: SynchronizingAction) {
        let counter = match action {
            SynchronizingAction::Nothing => &mut self.unchanged,
            SynchronizingAction::AddToLocal => &mut self.added_locally,
            SynchronizingAction::AddToRemote => &mut self.added_remotely,
            SynchronizingAction::Merge => &mut self.merged,
            SynchronizingAction::RemoveFromLocal => &mut self.removed_locally,
            SynchronizingAction::RemoveFromRemote => &mut self.removed_remotely,
        };
        *counter += 1;
    }
}

/// Summary of a synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub projects: EntityReport,
    pub objectives: EntityReport,
    /// The run stopped at the first failure
    pub aborted: bool,
}

impl SyncReport {
    pub fn failure_count(&self) -> usize {
        self.projects.failures.len() + self.objectives.failures.len()
    }
}

/// Where a phase stands after handling one tuple
enum Flow {
    Continue,
    Abort,
}

/// Drives one run of the engine against a remote connection.
pub struct Synchronizer<'a, C> {
    connection: &'a C,
    config: SynchronizationConfig,
}

impl<'a, C: ConnectionContext> Synchronizer<'a, C> {
    pub const fn new(connection: &'a C, config: SynchronizationConfig) -> Self {
        Self { connection, config }
    }

    /// Reconcile every project and objective. Failed entities are listed in
    /// the report; a cancelled run commits what it finished and returns
    /// [`Error::Cancelled`].
    pub async fn run(
        &self,
        context: &mut Context,
        sink: &impl ChangeSink,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        if let Some(user_id) = self.config.user_id {
            if context.get::<User>(user_id).is_none() {
                return Err(Error::Config(format!("user #{user_id} does not exist")));
            }
        }

        tracing::info!(
            connection = self.config.connection_label(),
            "Starting synchronization"
        );
        let mut report = SyncReport::default();
        let mut handled = 0;

        match self.run_phases(context, sink, cancel, &mut report, &mut handled).await {
            Ok(()) => {
                sink.commit(context).await?;
                tracing::info!(
                    connection = self.config.connection_label(),
                    handled,
                    failures = report.failure_count(),
                    aborted = report.aborted,
                    "Synchronization finished"
                );
                Ok(report)
            }
            Err(error) if error.is_cancelled() => {
                sink.commit(context).await?;
                tracing::warn!(handled, "Synchronization cancelled");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    async fn run_phases(
        &self,
        context: &mut Context,
        sink: &impl ChangeSink,
        cancel: &CancellationToken,
        report: &mut SyncReport,
        handled: &mut usize,
    ) -> Result<()> {
        let projects = self.project_tuples(context, cancel).await?;
        let strategy = ProjectStrategy::new(self.connection, self.config.user_id);
        let flow = self
            .run_phase(&strategy, projects, context, sink, cancel, &mut report.projects, handled, |project: &Project| {
                project.title.clone()
            })
            .await?;
        if matches!(flow, Flow::Abort) {
            report.aborted = true;
            return Ok(());
        }

        let (objectives, flow) = self.objective_tuples(context, cancel, &mut report.objectives).await?;
        if matches!(flow, Flow::Abort) {
            report.aborted = true;
            return Ok(());
        }
        let strategy = ObjectiveStrategy::new(self.connection);
        let flow = self
            .run_phase(&strategy, objectives, context, sink, cancel, &mut report.objectives, handled, |objective: &Objective| {
                objective.title.clone()
            })
            .await?;
        report.aborted = matches!(flow, Flow::Abort);
        Ok(())
    }

    async fn project_tuples(
        &self,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<Vec<SynchronizingTuple<Project>>> {
        let remote = self
            .connection
            .projects()
            .get_all(cancel)
            .await?
            .iter()
            .map(project_from_dto)
            .collect();
        let (local, synchronized) = split_stored(context, |project: &Project| project.is_synchronized, |id| {
            context.load_project_graph(id)
        });
        Ok(build_tuples(local, synchronized, remote, Project::shares_identity, no_natural_key))
    }

    /// Objective tuples. Remote objectives that cannot be read are reported
    /// and their tuples left alone.
    async fn objective_tuples(
        &self,
        context: &Context,
        cancel: &CancellationToken,
        report: &mut EntityReport,
    ) -> Result<(Vec<SynchronizingTuple<Objective>>, Flow)> {
        let mut flow = Flow::Continue;
        let mut unreadable = Vec::new();
        let mut remote = Vec::new();
        for dto in self.connection.objectives().get_all(cancel).await? {
            match objective_from_dto(&dto) {
                Ok(objective) => remote.push(objective),
                Err(error) => {
                    tracing::warn!(external_id = ?dto.external_id, %error, "Skipping unreadable remote objective");
                    report.failures.push(FailureRecord {
                        external_id: dto.external_id.clone(),
                        label: dto.title.clone(),
                        side: ObjectType::Remote,
                        message: compact_text(&error.to_string()),
                    });
                    if self.config.failure_policy == FailurePolicy::Abort {
                        flow = Flow::Abort;
                    }
                    unreadable.extend(dto.external_id);
                }
            }
        }

        let (local, synchronized) = split_stored(context, |objective: &Objective| objective.is_synchronized, |id| {
            context.load_objective_graph(id)
        });
        let tuples = build_tuples(local, synchronized, remote, Objective::shares_identity, no_natural_key)
            .into_iter()
            .filter(|tuple| {
                tuple_external_id(tuple).map_or(true, |external_id| !unreadable.contains(&external_id))
            })
            .collect();
        Ok((tuples, flow))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phase<T, S>(
        &self,
        strategy: &S,
        tuples: Vec<SynchronizingTuple<T>>,
        context: &mut Context,
        sink: &impl ChangeSink,
        cancel: &CancellationToken,
        report: &mut EntityReport,
        handled: &mut usize,
        label: fn(&T) -> String,
    ) -> Result<Flow>
    where
        T: SyncEntity,
        S: SynchronizationStrategy<T>,
    {
        for mut tuple in strategy.order(context, tuples) {
            if tuple.is_stale() {
                tracing::debug!(external_id = ?tuple_external_id(&tuple), "Skipping stale baseline");
                continue;
            }

            let action = tuple.determine_action();
            let failure = strategy.synchronize(context, &mut tuple, action, cancel).await?;
            *handled += 1;

            if let Some(failure) = failure {
                report.failures.push(failure_record(&failure, label));
                if self.config.failure_policy == FailurePolicy::Abort {
                    return Ok(Flow::Abort);
                }
            } else {
                report.tally(action);
            }

            if self.config.commit_due(*handled) {
                sink.commit(context).await?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Stored rows split into loaded local and synchronized graphs.
fn split_stored<T: SyncEntity>(
    context: &Context,
    is_synchronized: impl Fn(&T) -> bool,
    load: impl Fn(i64) -> Option<T>,
) -> (Vec<T>, Vec<T>) {
    let (synchronized, local): (Vec<&T>, Vec<&T>) = context.rows::<T>().partition(|row| is_synchronized(row));
    let load_all = |rows: Vec<&T>| -> Vec<T> { rows.into_iter().filter_map(|row| load(row.id())).collect() };
    (load_all(local), load_all(synchronized))
}

fn failure_record<T: SyncEntity>(failure: &SynchronizingResult<T>, label: fn(&T) -> String) -> FailureRecord {
    FailureRecord {
        external_id: failure
            .object
            .as_ref()
            .and_then(|object| object.external_id().map(str::to_string)),
        label: failure.object.as_ref().map(label).unwrap_or_default(),
        side: failure.object_type,
        message: compact_text(&failure.error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{InMemorySink, LinkKind};
    use crate::models::{FieldKind, Item, ItemType, ObjectiveItem};
    use crate::remote::mapping::item_to_dto;
    use crate::remote::memory::{InMemoryConnection, RemoteOperation};
    use crate::remote::DynamicFieldExternalDto;
    use crate::sync::test_support::{
        local_objective, local_project, remote_item, remote_objective, remote_project,
        seeded_connection, stored_pair,
    };
    use pretty_assertions::assert_eq;

    fn config() -> SynchronizationConfig {
        SynchronizationConfig {
            connection_info_id: 1,
            ..SynchronizationConfig::default()
        }
    }

    async fn run(
        connection: &InMemoryConnection,
        context: &mut Context,
        config: SynchronizationConfig,
    ) -> Result<SyncReport> {
        Synchronizer::new(connection, config)
            .run(context, &InMemorySink, &CancellationToken::new())
            .await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_project_is_added_then_left_alone() {
        let connection = seeded_connection(vec![remote_project("ext-1", "Tower", &[("ext-2", "/plan.pdf")])], Vec::new());
        let mut context = Context::new();

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.added_locally, 1);
        assert!(context.verify_mates().is_ok());

        let local = local_project(&context, "Tower").unwrap();
        assert_eq!(local.external_id.as_deref(), Some("ext-1"));
        let items = context.load_project_items(local.id);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id.as_deref(), Some("ext-2"));

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.unchanged, 1);
        assert!(connection.mutating_calls().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_project_is_pushed_with_its_items() {
        let connection = InMemoryConnection::new(1);
        let mut context = Context::new();
        let mut item = Item::new("/docs/plan.pdf");
        context.add(&mut item);
        let mut project = Project::new("Tower");
        project.items = Some(vec![item.clone()]);
        context.add(&mut project);

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.added_remotely, 1);

        let local = context.get::<Project>(project.id).unwrap();
        assert_eq!(local.external_id.as_deref(), Some("ext-1"));
        let mate = context.mate_of(local).unwrap();
        assert!(mate.is_synchronized);
        assert_eq!(mate.external_id.as_deref(), Some("ext-1"));
        assert_eq!(context.get::<Item>(item.id).unwrap().external_id.as_deref(), Some("ext-2"));

        let snapshot = connection.snapshot().await;
        assert_eq!(snapshot.projects[0].items[0].external_id.as_deref(), Some("ext-2"));
        assert!(context.verify_mates().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn new_local_item_gets_remote_id_after_update() {
        let connection = seeded_connection(vec![remote_project("P-1", "Tower", &[])], Vec::new());
        let mut context = Context::new();
        let (local, _) = stored_pair(&mut context, "P-1", "Tower");
        let mut item = Item::new("/a.txt");
        item.project_id = Some(local.id);
        context.add(&mut item);

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.merged, 1);
        let stored = context.get::<Item>(item.id).unwrap();
        assert_eq!(stored.external_id.as_deref(), Some("ext-1"));
        let mirror = context.mate_of(stored).unwrap();
        assert!(mirror.is_synchronized);
        assert_eq!(mirror.external_id.as_deref(), Some("ext-1"));
        assert_eq!(mirror.relative_path, "/a.txt");
        let calls = connection.mutating_calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, RemoteOperation::Update);

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.unchanged, 1);
        assert_eq!(connection.mutating_calls().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn objective_hierarchy_resolves_parents() {
        let connection = seeded_connection(
            vec![remote_project("ext-1", "Tower", &[])],
            vec![
                remote_objective("ext-3", "ext-1", Some("ext-2")),
                remote_objective("ext-2", "ext-1", None),
            ],
        );
        let mut context = Context::new();

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.added_locally, 2);
        assert_eq!(report.failure_count(), 0);

        let parent = local_objective(&context, "ext-2").unwrap();
        let child = local_objective(&context, "ext-3").unwrap();
        assert_eq!(child.parent_objective_id, Some(parent.id));
        assert_eq!(child.project_id, local_project(&context, "Tower").unwrap().id);

        let synced_child = context.mate_of(&child).unwrap();
        let synced_parent = context.mate_of(&parent).unwrap();
        assert_eq!(synced_child.parent_objective_id, Some(synced_parent.id));
        assert!(context.verify_mates().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn objectives_share_one_remote_item() {
        let shared = item_to_dto(&remote_item("ext-20", "/x.jpg"));
        let mut first = remote_objective("ext-3", "ext-1", None);
        first.items = vec![shared.clone()];
        let mut second = remote_objective("ext-4", "ext-1", None);
        second.items = vec![shared];
        let connection = seeded_connection(vec![remote_project("ext-1", "Tower", &[])], vec![first, second]);
        let mut context = Context::new();

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.added_locally, 2);
        assert_eq!(report.failure_count(), 0);

        let items = context.filter::<Item>(|item| !item.is_synchronized);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id.as_deref(), Some("ext-20"));
        assert_eq!(context.filter::<Item>(|item| item.is_synchronized).len(), 1);
        let links = context.links(LinkKind::ObjectiveItem);
        for external_id in ["ext-3", "ext-4"] {
            let objective = local_objective(&context, external_id).unwrap();
            assert!(links.contains(objective.id, items[0].id));
        }
        assert!(context.verify_mates().is_ok());

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.unchanged, 2);
        assert_eq!(context.count::<Item>(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolvable_parent_fails_the_child() {
        let connection = seeded_connection(
            vec![remote_project("ext-1", "Tower", &[])],
            vec![
                remote_objective("ext-3", "ext-1", Some("ext-404")),
                remote_objective("ext-2", "ext-1", None),
            ],
        );
        let mut context = Context::new();

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.added_locally, 1);
        assert_eq!(report.objectives.failures.len(), 1);
        let failure = &report.objectives.failures[0];
        assert_eq!(failure.external_id.as_deref(), Some("ext-3"));
        assert_eq!(failure.side, ObjectType::Remote);
        assert!(local_objective(&context, "ext-3").is_none());
        assert!(local_objective(&context, "ext-2").is_some());
        assert!(context.verify_mates().is_ok());
    }

    /// Sync one project item, then edit its type on both sides with the given clocks.
    async fn conflicting_item_type(local_clock: i64, remote_clock: i64) -> (Item, ItemType) {
        let connection = seeded_connection(vec![remote_project("ext-1", "Tower", &[("ext-2", "/plan.pdf")])], Vec::new());
        let mut context = Context::new();
        run(&connection, &mut context, config()).await.unwrap();

        let mut remote = connection.snapshot().await.projects[0].clone();
        remote.items[0].item_type = ItemType::Bim;
        remote.updated_at = chrono::DateTime::from_timestamp_millis(remote_clock).unwrap();
        connection
            .projects()
            .update(&remote, &CancellationToken::new())
            .await
            .unwrap();

        let mut local = context
            .find::<Item>(|item| !item.is_synchronized)
            .cloned()
            .unwrap();
        local.item_type = ItemType::Media;
        local.updated_at = local_clock;
        context.update(&mut local).unwrap();

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.merged, 1);
        assert_eq!(report.failure_count(), 0);

        let merged = context.get::<Item>(local.id).cloned().unwrap();
        let pushed = connection.snapshot().await.projects[0].items[0].item_type;
        (merged, pushed)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn later_local_edit_wins_over_remote_child_edit() {
        let (merged, pushed) = conflicting_item_type(1_800_000_000_000, 1_700_000_000_000).await;
        assert_eq!(merged.item_type, ItemType::Media);
        assert_eq!(pushed, ItemType::Media);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn later_remote_edit_wins_over_local_child_edit() {
        let (merged, pushed) = conflicting_item_type(1_800_000_000_000, 1_900_000_000_000).await;
        assert_eq!(merged.item_type, ItemType::Bim);
        assert_eq!(pushed, ItemType::Bim);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_objective_is_pushed_with_linked_item() {
        let connection = seeded_connection(vec![remote_project("ext-1", "Tower", &[])], Vec::new());
        let mut context = Context::new();
        run(&connection, &mut context, config()).await.unwrap();

        let project = local_project(&context, "Tower").unwrap();
        let mut item = Item::new("/photos/railing.jpg");
        context.add(&mut item);
        let mut objective = Objective::new(project.id, "Check railing");
        objective.items = Some(vec![ObjectiveItem::new(0, item)]);
        context.add(&mut objective);

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.added_remotely, 1);
        let snapshot = connection.snapshot().await;
        let pushed = &snapshot.objectives[0];
        assert_eq!(pushed.project_external_id.as_deref(), Some("ext-1"));
        assert_eq!(pushed.items.len(), 1);

        let stored = context.get::<Objective>(objective.id).unwrap();
        assert_eq!(stored.external_id, pushed.external_id);
        let linked = context.load_objective_items(objective.id);
        assert_eq!(linked[0].item.external_id, pushed.items[0].external_id);
        assert!(context.verify_mates().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removals_follow_the_other_side() {
        let connection = seeded_connection(
            vec![remote_project("ext-1", "Tower", &[])],
            vec![
                remote_objective("ext-2", "ext-1", None),
                remote_objective("ext-3", "ext-1", None),
            ],
        );
        let mut context = Context::new();
        run(&connection, &mut context, config()).await.unwrap();

        let gone = connection.snapshot().await.objectives[0].clone();
        connection
            .objectives()
            .remove(&gone, &CancellationToken::new())
            .await
            .unwrap();
        let removed = local_objective(&context, "ext-3").unwrap();
        context.remove::<Objective>(removed.id);

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.removed_locally, 1);
        assert_eq!(report.objectives.removed_remotely, 1);
        assert_eq!(context.count::<Objective>(), 0);
        assert!(connection.snapshot().await.objectives.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_entity_is_rolled_back_and_reported() {
        let connection = InMemoryConnection::new(1);
        connection.fail_on(RemoteOperation::Add, "Broken").await;
        let mut context = Context::new();
        context.add(&mut Project::new("Broken"));
        context.add(&mut Project::new("Tower"));

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.projects.added_remotely, 1);
        assert_eq!(report.projects.failures.len(), 1);
        assert_eq!(report.projects.failures[0].label, "Broken");
        assert_eq!(report.projects.failures[0].side, ObjectType::Local);
        assert!(!report.aborted);

        let broken = local_project(&context, "Broken").unwrap();
        assert_eq!(broken.synchronization_mate_id, None);
        assert_eq!(context.count::<Project>(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn abort_policy_stops_at_first_failure() {
        let connection = InMemoryConnection::new(1);
        connection.fail_on(RemoteOperation::Add, "Broken").await;
        let mut context = Context::new();
        context.add(&mut Project::new("Broken"));
        context.add(&mut Project::new("Tower"));

        let config = SynchronizationConfig {
            failure_policy: FailurePolicy::Abort,
            ..config()
        };
        let report = run(&connection, &mut context, config).await.unwrap();
        assert!(report.aborted);
        assert_eq!(report.projects.added_remotely, 0);
        assert_eq!(report.projects.failures.len(), 1);
        assert!(connection.snapshot().await.projects.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_commits_finished_work() {
        let connection = InMemoryConnection::new(1);
        connection.cancel_on(RemoteOperation::Add, "Second").await;
        let mut context = Context::new();
        context.add(&mut Project::new("First"));
        context.add(&mut Project::new("Second"));
        context.mark_clean();

        let error = run(&connection, &mut context, config()).await.unwrap_err();
        assert!(error.is_cancelled());
        assert!(!context.has_changes());
        let first = local_project(&context, "First").unwrap();
        assert!(first.synchronization_mate_id.is_some());
        let second = local_project(&context, "Second").unwrap();
        assert_eq!(second.synchronization_mate_id, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreadable_remote_objective_is_skipped() {
        let mut broken = remote_objective("ext-2", "ext-1", None);
        broken.dynamic_fields = vec![DynamicFieldExternalDto {
            external_id: Some("ext-9".into()),
            name: "Floor".into(),
            kind: FieldKind::Integer,
            value: "twelve".into(),
            children: Vec::new(),
        }];
        let connection = seeded_connection(vec![remote_project("ext-1", "Tower", &[])], vec![broken]);
        let mut context = Context::new();

        let report = run(&connection, &mut context, config()).await.unwrap();
        assert_eq!(report.objectives.failures.len(), 1);
        assert_eq!(report.objectives.failures[0].external_id.as_deref(), Some("ext-2"));
        assert_eq!(report.objectives.failures[0].side, ObjectType::Remote);
        assert_eq!(context.count::<Objective>(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn acting_user_is_linked_to_projects() {
        let connection = seeded_connection(vec![remote_project("ext-1", "Tower", &[])], Vec::new());
        let mut context = Context::new();
        let mut user = User::new("jdoe", "J. Doe");
        context.add(&mut user);

        let config = SynchronizationConfig {
            user_id: Some(user.id),
            ..config()
        };
        run(&connection, &mut context, config).await.unwrap();
        let local = local_project(&context, "Tower").unwrap();
        let synced = context.mate_of(&local).unwrap();
        assert!(context.links(LinkKind::UserProject).contains(user.id, local.id));
        assert!(context.links(LinkKind::UserProject).contains(user.id, synced.id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_user_is_a_config_error() {
        let connection = InMemoryConnection::new(1);
        let config = SynchronizationConfig {
            user_id: Some(42),
            ..config()
        };
        let error = run(&connection, &mut Context::new(), config).await.unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn report_serializes_failures() {
        let mut report = SyncReport::default();
        report.objectives.failures.push(FailureRecord {
            external_id: Some("ext-4".into()),
            label: "Railing".into(),
            side: ObjectType::Remote,
            message: "Remote error: rejected".into(),
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["objectives"]["failures"][0]["side"], "remote");
        assert_eq!(report.failure_count(), 1);
    }
}
