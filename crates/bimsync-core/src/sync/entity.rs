//! Storage-side behaviour shared by every entity the engine reconciles

use super::tuple::{ObjectType, SynchronizingTuple};
use crate::context::{Context, Record};
use crate::error::Result;
use crate::models::{
    BimElement, DetachedCopy, DynamicField, Item, Objective, Project, SyncEquivalent,
    Synchronizable,
};

/// An entity stored in the unit of work that can take part in a tuple.
pub trait SyncEntity: Record + DetachedCopy + SyncEquivalent {
    /// Local and synchronized sides are one storage row.
    const SHARED_ROW: bool = false;

    fn external_id(&self) -> Option<&str>;
    fn set_external_id(&mut self, external_id: Option<String>);
    fn mate_id(&self) -> Option<i64>;
    fn set_mate_id(&mut self, mate_id: Option<i64>);
    fn mark_synchronized(&mut self);
    /// Timestamp that decides conflicts; `None` lets the remote side win.
    fn clock(&self) -> Option<i64>;
    /// Whether `candidate` is the same stored entity as a side of `tuple`.
    fn shares_identity(tuple: &SynchronizingTuple<Self>, candidate: &Self) -> bool;
}

/// Identity of synchronizable rows: same row, mate reference or external id.
pub fn shares_synchronizable_identity<T: Record + Synchronizable>(
    tuple: &SynchronizingTuple<T>,
    candidate: &T,
) -> bool {
    let candidate_id = candidate.id();
    ObjectType::ALL
        .into_iter()
        .filter_map(|side| tuple.get(side))
        .any(|member| {
            let member_id = member.id();
            (candidate_id != 0 && member_id == candidate_id)
                || (member_id != 0 && candidate.synchronization_mate_id() == Some(member_id))
                || (candidate_id != 0 && member.synchronization_mate_id() == Some(candidate_id))
                || matches!(
                    (member.external_id(), candidate.external_id()),
                    (Some(left), Some(right)) if left == right
                )
        })
}

macro_rules! impl_sync_entity {
    ($entity:ty) => {
        impl SyncEntity for $entity {
            fn external_id(&self) -> Option<&str> {
                Synchronizable::external_id(self)
            }

            fn set_external_id(&mut self, external_id: Option<String>) {
                Synchronizable::set_external_id(self, external_id);
            }

            fn mate_id(&self) -> Option<i64> {
                self.synchronization_mate_id()
            }

            fn set_mate_id(&mut self, mate_id: Option<i64>) {
                self.set_synchronization_mate_id(mate_id);
            }

            fn mark_synchronized(&mut self) {
                self.set_synchronized(true);
                self.set_synchronization_mate_id(None);
            }

            fn clock(&self) -> Option<i64> {
                Some(self.updated_at())
            }

            fn shares_identity(tuple: &SynchronizingTuple<Self>, candidate: &Self) -> bool {
                shares_synchronizable_identity(tuple, candidate)
            }
        }
    };
}

impl_sync_entity!(Project);
impl_sync_entity!(Objective);
impl_sync_entity!(Item);
impl_sync_entity!(DynamicField);

impl SyncEntity for BimElement {
    const SHARED_ROW: bool = true;

    fn external_id(&self) -> Option<&str> {
        None
    }

    fn set_external_id(&mut self, _external_id: Option<String>) {}

    fn mate_id(&self) -> Option<i64> {
        None
    }

    fn set_mate_id(&mut self, _mate_id: Option<i64>) {}

    fn mark_synchronized(&mut self) {}

    fn clock(&self) -> Option<i64> {
        None
    }

    fn shares_identity(tuple: &SynchronizingTuple<Self>, candidate: &Self) -> bool {
        candidate.id != 0
            && ObjectType::ALL
                .into_iter()
                .filter_map(|side| tuple.get(side))
                .any(|member| member.id == candidate.id)
    }
}

/// External id shared by the tuple, preferring the remote side.
pub fn tuple_external_id<T: SyncEntity>(tuple: &SynchronizingTuple<T>) -> Option<String> {
    [ObjectType::Remote, ObjectType::Synchronized, ObjectType::Local]
        .into_iter()
        .filter_map(|side| tuple.get(side))
        .find_map(|member| member.external_id().map(str::to_string))
}

/// Give the tuple a baseline when it has none.
///
/// The local side's mate is reused when it exists; otherwise a synchronized
/// copy of `source` is created for this run.
pub fn ensure_baseline<T: SyncEntity>(
    context: &Context,
    tuple: &mut SynchronizingTuple<T>,
    source: ObjectType,
) {
    if tuple.synchronized.is_some() {
        return;
    }

    if T::SHARED_ROW {
        if let Some(local) = tuple.local.clone() {
            tuple.synthesize_baseline(local);
        }
        return;
    }

    let mate = tuple
        .local
        .as_ref()
        .and_then(SyncEntity::mate_id)
        .and_then(|mate_id| context.get::<T>(mate_id))
        .cloned();
    if let Some(mate) = mate {
        tuple.set(ObjectType::Synchronized, Some(mate));
        return;
    }

    let Some(source) = tuple.get(source).or_else(|| tuple.any_side()) else {
        return;
    };
    let mut baseline = source.detached_copy();
    baseline.mark_synchronized();
    baseline.set_external_id(tuple_external_id(tuple));
    tuple.synthesize_baseline(baseline);
}

/// Copy the shared external id onto the stored sides that miss it.
pub fn propagate_external_id<T: SyncEntity>(tuple: &mut SynchronizingTuple<T>) {
    let Some(external_id) = tuple_external_id(tuple) else {
        return;
    };
    for side in [ObjectType::Synchronized, ObjectType::Local] {
        let differs = tuple
            .get(side)
            .is_some_and(|member| member.external_id() != Some(external_id.as_str()));
        if differs {
            if let Some(member) = tuple.get_mut(side) {
                member.set_external_id(Some(external_id.clone()));
            }
            tuple.mark_changed(side);
        }
    }
}

/// Stage the local and synchronized sides of a tuple.
///
/// New rows are added, changed rows updated. The baseline is written first
/// so that the local row can reference it as its mate.
pub fn persist<T: SyncEntity>(context: &mut Context, tuple: &mut SynchronizingTuple<T>) -> Result<()> {
    let local_changed = tuple.local_changed();
    let synchronized_changed = tuple.synchronized_changed();

    if T::SHARED_ROW {
        let row = match (tuple.local.as_mut(), tuple.synchronized.as_mut()) {
            (Some(row), _) | (None, Some(row)) => row,
            (None, None) => return Ok(()),
        };
        if row.id() == 0 {
            context.add(row);
        } else if local_changed || synchronized_changed {
            context.update(row)?;
        }
        let stored = row.clone();
        if tuple.local.is_some() {
            tuple.local = Some(stored.clone());
        }
        tuple.synchronized = Some(stored);
        return Ok(());
    }

    if let Some(synchronized) = tuple.synchronized.as_mut() {
        if synchronized.id() == 0 {
            context.add(synchronized);
        } else if synchronized_changed {
            context.update(synchronized)?;
        }
    }

    let mate_id = tuple.synchronized.as_ref().map(Record::id);
    if let Some(local) = tuple.local.as_mut() {
        let mate_changed = local.mate_id() != mate_id;
        if mate_changed {
            local.set_mate_id(mate_id);
        }
        if local.id() == 0 {
            context.add(local);
        } else if local_changed || mate_changed {
            context.update(local)?;
        }
    }
    Ok(())
}
