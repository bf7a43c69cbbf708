//! In-memory remote connection
//!
//! Keeps a [`RemoteSnapshot`] of projects and objectives, assigns `ext-N`
//! external ids to new entities and their children, records every call and
//! can be told to fail or cancel specific calls. The CLI runs against it
//! with a snapshot file; tests use it as the remote double.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::dto::{DynamicFieldExternalDto, ItemExternalDto, ObjectiveExternalDto, ProjectExternalDto};
use super::{ConnectionContext, RemoteSynchronizer};
use crate::error::{Error, Result};

const EXTERNAL_ID_PREFIX: &str = "ext-";

/// Serialized state of the in-memory remote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub projects: Vec<ProjectExternalDto>,
    #[serde(default)]
    pub objectives: Vec<ObjectiveExternalDto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOperation {
    GetAll,
    Add,
    Update,
    Remove,
}

/// What an injected fault does to a matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Fail,
    Cancel,
}

/// A recorded remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteCall {
    pub operation: RemoteOperation,
    pub entity: &'static str,
    pub external_id: Option<String>,
    pub label: String,
}

#[derive(Debug, Default)]
struct RemoteState {
    snapshot: RemoteSnapshot,
    next_number: u64,
    calls: Vec<RemoteCall>,
    faults: HashMap<(RemoteOperation, String), Fault>,
}

impl RemoteState {
    fn allocate(&mut self) -> String {
        let id = format!("{EXTERNAL_ID_PREFIX}{}", self.next_number);
        self.next_number += 1;
        id
    }

    fn fault(&self, operation: RemoteOperation, label: &str) -> Option<Fault> {
        self.faults.get(&(operation, label.to_string())).copied()
    }
}

/// An entity kept by the in-memory remote
pub trait RemoteRecord: Clone {
    const ENTITY: &'static str;

    fn external_id(&self) -> Option<&str>;
    fn label(&self) -> &str;
    /// Give the entity and each of its children without an external id a fresh one.
    fn assign_ids(&mut self, allocate: &mut dyn FnMut() -> String);
    fn collection(snapshot: &RemoteSnapshot) -> &Vec<Self>;
    fn collection_mut(snapshot: &mut RemoteSnapshot) -> &mut Vec<Self>;
}

fn assign_if_missing(external_id: &mut Option<String>, allocate: &mut dyn FnMut() -> String) {
    if external_id.is_none() {
        *external_id = Some(allocate());
    }
}

fn assign_item_ids(items: &mut [ItemExternalDto], allocate: &mut dyn FnMut() -> String) {
    for item in items {
        assign_if_missing(&mut item.external_id, allocate);
    }
}

fn assign_field_ids(fields: &mut [DynamicFieldExternalDto], allocate: &mut dyn FnMut() -> String) {
    for field in fields {
        assign_if_missing(&mut field.external_id, allocate);
        assign_field_ids(&mut field.children, allocate);
    }
}

impl RemoteRecord for ProjectExternalDto {
    const ENTITY: &'static str = "project";

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn label(&self) -> &str {
        &self.title
    }

    fn assign_ids(&mut self, allocate: &mut dyn FnMut() -> String) {
        assign_if_missing(&mut self.external_id, allocate);
        assign_item_ids(&mut self.items, allocate);
    }

    fn collection(snapshot: &RemoteSnapshot) -> &Vec<Self> {
        &snapshot.projects
    }

    fn collection_mut(snapshot: &mut RemoteSnapshot) -> &mut Vec<Self> {
        &mut snapshot.projects
    }
}

impl RemoteRecord for ObjectiveExternalDto {
    const ENTITY: &'static str = "objective";

    fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn label(&self) -> &str {
        &self.title
    }

    fn assign_ids(&mut self, allocate: &mut dyn FnMut() -> String) {
        assign_if_missing(&mut self.external_id, allocate);
        assign_item_ids(&mut self.items, allocate);
        assign_field_ids(&mut self.dynamic_fields, allocate);
    }

    fn collection(snapshot: &RemoteSnapshot) -> &Vec<Self> {
        &snapshot.objectives
    }

    fn collection_mut(snapshot: &mut RemoteSnapshot) -> &mut Vec<Self> {
        &mut snapshot.objectives
    }
}

/// In-memory synchronizer for one entity type
#[derive(Debug)]
pub struct InMemorySynchronizer<D> {
    state: Arc<Mutex<RemoteState>>,
    _entity: PhantomData<D>,
}

impl<D: RemoteRecord> InMemorySynchronizer<D> {
    fn new(state: Arc<Mutex<RemoteState>>) -> Self {
        Self {
            state,
            _entity: PhantomData,
        }
    }

    fn record(
        state: &mut RemoteState,
        operation: RemoteOperation,
        dto: Option<&D>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let label = dto.map(D::label).unwrap_or_default().to_string();
        state.calls.push(RemoteCall {
            operation,
            entity: D::ENTITY,
            external_id: dto.and_then(|dto| dto.external_id().map(str::to_string)),
            label: label.clone(),
        });

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match state.fault(operation, &label) {
            Some(Fault::Fail) => Err(Error::Remote(format!(
                "{} '{label}' rejected by remote",
                D::ENTITY
            ))),
            Some(Fault::Cancel) => {
                cancel.cancel();
                Err(Error::Cancelled)
            }
            None => Ok(()),
        }
    }

    fn position(state: &RemoteState, dto: &D) -> Result<usize> {
        let external_id = dto.external_id().ok_or_else(|| {
            Error::Remote(format!("{} '{}' has no external id", D::ENTITY, dto.label()))
        })?;
        D::collection(&state.snapshot)
            .iter()
            .position(|stored| stored.external_id() == Some(external_id))
            .ok_or_else(|| Error::Remote(format!("{} {external_id} not found", D::ENTITY)))
    }
}

impl<D: RemoteRecord> RemoteSynchronizer<D> for InMemorySynchronizer<D> {
    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<D>> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, RemoteOperation::GetAll, None, cancel)?;
        Ok(D::collection(&state.snapshot).clone())
    }

    async fn add(&self, dto: &D, cancel: &CancellationToken) -> Result<D> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, RemoteOperation::Add, Some(dto), cancel)?;

        let mut created = dto.clone();
        created.assign_ids(&mut || state.allocate());
        D::collection_mut(&mut state.snapshot).push(created.clone());
        tracing::debug!(entity = D::ENTITY, external_id = ?created.external_id(), "Remote add");
        Ok(created)
    }

    async fn update(&self, dto: &D, cancel: &CancellationToken) -> Result<D> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, RemoteOperation::Update, Some(dto), cancel)?;

        let index = Self::position(&state, dto)?;
        let mut updated = dto.clone();
        updated.assign_ids(&mut || state.allocate());
        D::collection_mut(&mut state.snapshot)[index] = updated.clone();
        Ok(updated)
    }

    async fn remove(&self, dto: &D, cancel: &CancellationToken) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::record(&mut state, RemoteOperation::Remove, Some(dto), cancel)?;

        let index = Self::position(&state, dto)?;
        D::collection_mut(&mut state.snapshot).remove(index);
        Ok(())
    }
}

/// In-memory remote connection over a [`RemoteSnapshot`]
#[derive(Debug)]
pub struct InMemoryConnection {
    connection_info_id: i64,
    state: Arc<Mutex<RemoteState>>,
    projects: InMemorySynchronizer<ProjectExternalDto>,
    objectives: InMemorySynchronizer<ObjectiveExternalDto>,
}

impl InMemoryConnection {
    pub fn new(connection_info_id: i64) -> Self {
        Self::from_snapshot(connection_info_id, RemoteSnapshot::default())
    }

    /// Seed the remote from a snapshot. New ids continue after the highest
    /// `ext-N` already present.
    pub fn from_snapshot(connection_info_id: i64, snapshot: RemoteSnapshot) -> Self {
        let next_number = highest_external_number(&snapshot) + 1;
        let state = Arc::new(Mutex::new(RemoteState {
            snapshot,
            next_number,
            ..RemoteState::default()
        }));
        Self {
            connection_info_id,
            projects: InMemorySynchronizer::new(Arc::clone(&state)),
            objectives: InMemorySynchronizer::new(Arc::clone(&state)),
            state,
        }
    }

    pub fn from_json(connection_info_id: i64, payload: &str) -> Result<Self> {
        let snapshot: RemoteSnapshot = serde_json::from_str(payload)?;
        Ok(Self::from_snapshot(connection_info_id, snapshot))
    }

    pub async fn snapshot(&self) -> RemoteSnapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot().await)?)
    }

    /// Make every `operation` call on the entity labelled `label` fail.
    pub async fn fail_on(&self, operation: RemoteOperation, label: impl Into<String>) {
        self.inject(operation, label.into(), Fault::Fail).await;
    }

    /// Make every `operation` call on the entity labelled `label` cancel the run.
    pub async fn cancel_on(&self, operation: RemoteOperation, label: impl Into<String>) {
        self.inject(operation, label.into(), Fault::Cancel).await;
    }

    async fn inject(&self, operation: RemoteOperation, label: String, fault: Fault) {
        self.state
            .lock()
            .await
            .faults
            .insert((operation, label), fault);
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Recorded calls other than `get_all`.
    pub async fn mutating_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.operation != RemoteOperation::GetAll)
            .collect()
    }
}

impl ConnectionContext for InMemoryConnection {
    type Projects = InMemorySynchronizer<ProjectExternalDto>;
    type Objectives = InMemorySynchronizer<ObjectiveExternalDto>;

    fn projects(&self) -> &Self::Projects {
        &self.projects
    }

    fn objectives(&self) -> &Self::Objectives {
        &self.objectives
    }

    fn connection_info_id(&self) -> i64 {
        self.connection_info_id
    }
}

fn external_number(external_id: Option<&str>) -> u64 {
    external_id
        .and_then(|id| id.strip_prefix(EXTERNAL_ID_PREFIX))
        .and_then(|number| number.parse().ok())
        .unwrap_or(0)
}

fn highest_field_number(fields: &[DynamicFieldExternalDto]) -> u64 {
    fields
        .iter()
        .map(|field| {
            external_number(field.external_id.as_deref()).max(highest_field_number(&field.children))
        })
        .max()
        .unwrap_or(0)
}

fn highest_item_number(items: &[ItemExternalDto]) -> u64 {
    items
        .iter()
        .map(|item| external_number(item.external_id.as_deref()))
        .max()
        .unwrap_or(0)
}

fn highest_external_number(snapshot: &RemoteSnapshot) -> u64 {
    let projects = snapshot.projects.iter().map(|project| {
        external_number(project.external_id.as_deref()).max(highest_item_number(&project.items))
    });
    let objectives = snapshot.objectives.iter().map(|objective| {
        external_number(objective.external_id.as_deref())
            .max(highest_item_number(&objective.items))
            .max(highest_field_number(&objective.dynamic_fields))
    });
    projects.chain(objectives).max().unwrap_or(0)
}
