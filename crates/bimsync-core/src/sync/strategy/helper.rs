//! Operation flows shared by every strategy

use tokio_util::sync::CancellationToken;

use super::{StrategyOutcome, SynchronizationStrategy};
use crate::context::{Context, Record};
use crate::error::{Error, Result};
use crate::models::DetachedCopy;
use crate::remote::RemoteSynchronizer;
use crate::sync::entity::{ensure_baseline, persist, propagate_external_id, SyncEntity};
use crate::sync::result::fold_outcome;
use crate::sync::tuple::{ObjectType, SynchronizingTuple};

/// Tuple state at the start of an operation. The context journals its own
/// changes from the same point.
pub(super) struct Checkpoint<T> {
    tuple: SynchronizingTuple<T>,
}

pub(super) fn begin<T: Clone>(
    context: &mut Context,
    tuple: &SynchronizingTuple<T>,
    cancel: &CancellationToken,
) -> Result<Checkpoint<T>> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    context.checkpoint();
    Ok(Checkpoint {
        tuple: tuple.clone(),
    })
}

/// Roll back on failure and fold the outcome.
pub(super) fn finish<T: Clone>(
    outcome: Result<()>,
    checkpoint: Checkpoint<T>,
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
    side: ObjectType,
) -> StrategyOutcome<T> {
    if outcome.is_err() {
        context.rollback();
        *tuple = checkpoint.tuple;
    } else {
        context.release();
    }
    fold_outcome(outcome, tuple, side)
}

pub(super) fn add_local<T, S>(
    strategy: &S,
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
) -> Result<()>
where
    T: SyncEntity,
    S: SynchronizationStrategy<T> + ?Sized,
{
    let local = tuple.remote.as_ref().map(DetachedCopy::detached_copy);
    tuple.set(ObjectType::Local, local);
    ensure_baseline(context, tuple, ObjectType::Remote);
    strategy.prepare(context, tuple)?;
    strategy.merger().merge(context, tuple)?;
    strategy.after_merge(context, tuple)?;
    propagate_external_id(tuple);
    persist(context, tuple)?;
    strategy.after_persist(context, tuple)
}

pub(super) async fn add_remote<T, S>(
    strategy: &S,
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: SyncEntity,
    S: SynchronizationStrategy<T> + ?Sized,
{
    ensure_baseline(context, tuple, ObjectType::Local);
    strategy.prepare(context, tuple)?;
    let remote = tuple.local.as_ref().map(DetachedCopy::detached_copy);
    tuple.set(ObjectType::Remote, remote);
    strategy.merger().merge(context, tuple)?;
    strategy.after_merge(context, tuple)?;
    push(strategy, context, tuple, cancel, true).await?;
    propagate_external_id(tuple);
    persist(context, tuple)?;
    strategy.after_persist(context, tuple)
}

pub(super) async fn merge<T, S>(
    strategy: &S,
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: SyncEntity,
    S: SynchronizationStrategy<T> + ?Sized,
{
    ensure_baseline(context, tuple, ObjectType::Local);
    strategy.prepare(context, tuple)?;
    strategy.merger().merge(context, tuple)?;
    strategy.after_merge(context, tuple)?;
    push(strategy, context, tuple, cancel, false).await?;
    propagate_external_id(tuple);
    persist(context, tuple)?;
    strategy.after_persist(context, tuple)
}

/// Remove the local row, then its baseline.
pub(super) fn remove_local<T: SyncEntity>(
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
) -> Result<()> {
    for side in [ObjectType::Local, ObjectType::Synchronized] {
        let Some(id) = tuple.get(side).map(Record::id) else {
            continue;
        };
        if id != 0 {
            context.remove::<T>(id);
        }
        tuple.set(side, None);
    }
    Ok(())
}

pub(super) async fn remove_remote<T, S>(
    strategy: &S,
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: SyncEntity,
    S: SynchronizationStrategy<T> + ?Sized,
{
    if let Some(remote) = tuple.remote.as_ref() {
        let dto = strategy.to_dto(remote);
        strategy.remote().remove(&dto, cancel).await?;
    }
    tuple.set(ObjectType::Remote, None);
    remove_local(context, tuple)
}

/// Send the remote side when it changed and take over the answer.
async fn push<T, S>(
    strategy: &S,
    context: &mut Context,
    tuple: &mut SynchronizingTuple<T>,
    cancel: &CancellationToken,
    create: bool,
) -> Result<()>
where
    T: SyncEntity,
    S: SynchronizationStrategy<T> + ?Sized,
{
    if !tuple.remote_changed() {
        return Ok(());
    }
    let Some(remote) = tuple.remote.as_ref() else {
        return Ok(());
    };

    let dto = strategy.to_dto(remote);
    let answer = if create {
        strategy.remote().add(&dto, cancel).await?
    } else {
        strategy.remote().update(&dto, cancel).await?
    };
    tuple.remote = Some(strategy.from_dto(&answer)?);
    strategy.after_remote(context, tuple)
}
