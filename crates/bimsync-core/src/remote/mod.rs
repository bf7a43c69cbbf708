//! Boundary to a remote connection
//!
//! The engine reaches the remote system only through [`ConnectionContext`],
//! which hands out one [`RemoteSynchronizer`] per root entity type. Every
//! call accepts the run's cancellation token.

pub mod dto;
pub mod mapping;
pub mod memory;

pub use dto::{
    BimElementExternalDto, DynamicFieldExternalDto, ItemExternalDto, ObjectiveExternalDto,
    ObjectiveTypeExternalDto, ProjectExternalDto,
};

use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Remote CRUD for one entity type, over its DTO shape
#[allow(async_fn_in_trait)]
pub trait RemoteSynchronizer<D> {
    /// Fetch the current remote state of every entity.
    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<D>>;

    /// Create an entity. The returned DTO carries the remote-assigned ids.
    async fn add(&self, dto: &D, cancel: &CancellationToken) -> Result<D>;

    /// Update an entity identified by its external id.
    async fn update(&self, dto: &D, cancel: &CancellationToken) -> Result<D>;

    async fn remove(&self, dto: &D, cancel: &CancellationToken) -> Result<()>;
}

/// One remote connection: a synchronizer per root entity type
pub trait ConnectionContext {
    type Projects: RemoteSynchronizer<ProjectExternalDto>;
    type Objectives: RemoteSynchronizer<ObjectiveExternalDto>;

    fn projects(&self) -> &Self::Projects;
    fn objectives(&self) -> &Self::Objectives;

    /// Id stamped onto dynamic fields synchronized through this connection.
    fn connection_info_id(&self) -> i64;
}
