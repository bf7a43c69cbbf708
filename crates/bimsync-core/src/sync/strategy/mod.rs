//! Per-entity synchronization strategies
//!
//! A strategy knows how to carry out each [`SynchronizingAction`] for one
//! root entity type. The operations themselves are shared: every operation
//! checks cancellation, works against a checkpoint of the context and the
//! tuple, and rolls both back when it fails. A failure other than
//! cancellation becomes a [`SynchronizingResult`] so the run can go on.

mod helper;
mod objective;
mod ordering;
mod project;

pub use objective::ObjectiveStrategy;
pub use ordering::order_by_parent;
pub use project::ProjectStrategy;

use tokio_util::sync::CancellationToken;

use super::entity::SyncEntity;
use super::merger::Merger;
use super::result::SynchronizingResult;
use super::tuple::{ObjectType, SynchronizingAction, SynchronizingTuple};
use crate::context::Context;
use crate::error::Result;
use crate::remote::RemoteSynchronizer;

/// Outcome of one strategy operation: `None` on success
pub type StrategyOutcome<T> = Result<Option<SynchronizingResult<T>>>;

#[allow(async_fn_in_trait)]
pub trait SynchronizationStrategy<T: SyncEntity> {
    type Dto;
    type Remote: RemoteSynchronizer<Self::Dto>;

    fn remote(&self) -> &Self::Remote;
    fn merger(&self) -> &dyn Merger<T>;
    fn to_dto(&self, entity: &T) -> Self::Dto;
    fn from_dto(&self, dto: &Self::Dto) -> Result<T>;

    /// Order in which tuples are handled.
    fn order(&self, _context: &Context, tuples: Vec<SynchronizingTuple<T>>) -> Vec<SynchronizingTuple<T>> {
        tuples
    }

    /// Runs once the tuple has a baseline, before merging.
    fn prepare(&self, _context: &mut Context, _tuple: &mut SynchronizingTuple<T>) -> Result<()> {
        Ok(())
    }

    fn after_merge(&self, _context: &mut Context, _tuple: &mut SynchronizingTuple<T>) -> Result<()> {
        Ok(())
    }

    /// Runs after the remote side answered an add or update.
    fn after_remote(&self, _context: &mut Context, _tuple: &mut SynchronizingTuple<T>) -> Result<()> {
        Ok(())
    }

    fn after_persist(&self, _context: &mut Context, _tuple: &mut SynchronizingTuple<T>) -> Result<()> {
        Ok(())
    }

    async fn add_to_local(
        &self,
        context: &mut Context,
        tuple: &mut SynchronizingTuple<T>,
        cancel: &CancellationToken,
    ) -> StrategyOutcome<T> {
        let checkpoint = helper::begin(context, tuple, cancel)?;
        let outcome = helper::add_local(self, context, tuple);
        helper::finish(outcome, checkpoint, context, tuple, ObjectType::Remote)
    }

    async fn add_to_remote(
        &self,
        context: &mut Context,
        tuple: &mut SynchronizingTuple<T>,
        cancel: &CancellationToken,
    ) -> StrategyOutcome<T> {
        let checkpoint = helper::begin(context, tuple, cancel)?;
        let outcome = helper::add_remote(self, context, tuple, cancel).await;
        helper::finish(outcome, checkpoint, context, tuple, ObjectType::Local)
    }

    async fn merge(
        &self,
        context: &mut Context,
        tuple: &mut SynchronizingTuple<T>,
        cancel: &CancellationToken,
    ) -> StrategyOutcome<T> {
        let checkpoint = helper::begin(context, tuple, cancel)?;
        let outcome = helper::merge(self, context, tuple, cancel).await;
        helper::finish(outcome, checkpoint, context, tuple, ObjectType::Local)
    }

    async fn remove_from_local(
        &self,
        context: &mut Context,
        tuple: &mut SynchronizingTuple<T>,
        cancel: &CancellationToken,
    ) -> StrategyOutcome<T> {
        let checkpoint = helper::begin(context, tuple, cancel)?;
        let outcome = helper::remove_local(context, tuple);
        helper::finish(outcome, checkpoint, context, tuple, ObjectType::Local)
    }

    async fn remove_from_remote(
        &self,
        context: &mut Context,
        tuple: &mut SynchronizingTuple<T>,
        cancel: &CancellationToken,
    ) -> StrategyOutcome<T> {
        let checkpoint = helper::begin(context, tuple, cancel)?;
        let outcome = helper::remove_remote(self, context, tuple, cancel).await;
        helper::finish(outcome, checkpoint, context, tuple, ObjectType::Remote)
    }

    /// Carry out `action` on `tuple`.
    async fn synchronize(
        &self,
        context: &mut Context,
        tuple: &mut SynchronizingTuple<T>,
        action: SynchronizingAction,
        cancel: &CancellationToken,
    ) -> StrategyOutcome<T> {
        match action {
            SynchronizingAction::Nothing => Ok(None),
            SynchronizingAction::AddToLocal => self.add_to_local(context, tuple, cancel).await,
            SynchronizingAction::AddToRemote => self.add_to_remote(context, tuple, cancel).await,
            SynchronizingAction::Merge => self.merge(context, tuple, cancel).await,
            SynchronizingAction::RemoveFromLocal => self.remove_from_local(context, tuple, cancel).await,
            SynchronizingAction::RemoveFromRemote => {
                self.remove_from_remote(context, tuple, cancel).await
            }
        }
    }
}
