//! Reconciliation of child collections
//!
//! A [`ChildrenMerger`] runs a nested three-way synchronization over one
//! child collection of a parent tuple: the children of every side are paired
//! into child tuples, each child tuple is added, merged or removed, and the
//! parent collections are rebuilt from the result. Children are staged in the
//! context as they are reconciled, so the parent only has to persist its own
//! row and links.

use super::entity::{ensure_baseline, persist, propagate_external_id, SyncEntity};
use super::matcher::build_tuples;
use super::merger::Merger;
use super::tuple::{ObjectType, SynchronizingAction, SynchronizingTuple};
use crate::context::{Context, Record};
use crate::error::Result;
use crate::models::DetachedCopy;

/// How a parent holds its children.
///
/// `L` is the element stored in the parent collection and `C` the child
/// entity reconciled: a join record and its target for many-to-many links,
/// the child itself for owned collections.
pub struct ChildLink<P, L, C> {
    children: fn(&mut P) -> &mut Option<Vec<L>>,
    child: fn(&L) -> &C,
    make_link: fn(i64, C) -> L,
    load: fn(&Context, i64) -> Vec<L>,
}

impl<P, L, C> ChildLink<P, L, C> {
    /// Children reached through join records.
    pub fn joined(
        children: fn(&mut P) -> &mut Option<Vec<L>>,
        child: fn(&L) -> &C,
        make_link: fn(i64, C) -> L,
        load: fn(&Context, i64) -> Vec<L>,
    ) -> Self {
        Self {
            children,
            child,
            make_link,
            load,
        }
    }
}

fn itself<C>(child: &C) -> &C {
    child
}

fn owned_link<C>(_parent_id: i64, child: C) -> C {
    child
}

impl<P, C> ChildLink<P, C, C> {
    /// Children owned by the parent through a foreign key.
    pub fn owned(
        children: fn(&mut P) -> &mut Option<Vec<C>>,
        load: fn(&Context, i64) -> Vec<C>,
    ) -> Self {
        Self {
            children,
            child: itself::<C>,
            make_link: owned_link::<C>,
            load,
        }
    }
}

/// Predicate pairing a child with a tuple by natural key
pub type Belongs<C> = fn(&SynchronizingTuple<C>, &C) -> bool;
/// Releases a stored child from the parent with the given id
pub type Detach<C> = fn(&mut Context, i64, &C) -> Result<()>;
/// Finds an existing local row to reuse for a child added from the remote side
pub type Attach<P, C> = fn(&Context, &P, &C) -> Option<C>;
/// Decides whether a released child row is removed
pub type RemovalGuard<C> = fn(&Context, &C) -> bool;

/// Nested synchronization of one child collection
pub struct ChildrenMerger<'m, P, L, C> {
    merger: &'m dyn Merger<C>,
    link: ChildLink<P, L, C>,
    belongs: Belongs<C>,
    detach: Detach<C>,
    attach: Option<Attach<P, C>>,
    needs_removal: Option<RemovalGuard<C>>,
}

impl<'m, P, L, C> ChildrenMerger<'m, P, L, C>
where
    P: SyncEntity,
    L: Clone,
    C: SyncEntity,
{
    pub fn new(
        merger: &'m dyn Merger<C>,
        link: ChildLink<P, L, C>,
        belongs: Belongs<C>,
        detach: Detach<C>,
    ) -> Self {
        Self {
            merger,
            link,
            belongs,
            detach,
            attach: None,
            needs_removal: None,
        }
    }

    #[must_use]
    pub fn with_attacher(mut self, attach: Attach<P, C>) -> Self {
        self.attach = Some(attach);
        self
    }

    /// Keep released rows unless `guard` says they can go.
    #[must_use]
    pub fn with_removal_guard(mut self, guard: RemovalGuard<C>) -> Self {
        self.needs_removal = Some(guard);
        self
    }

    pub fn merge(&self, context: &mut Context, tuple: &mut SynchronizingTuple<P>) -> Result<()> {
        let before = self.load_children(context, tuple);
        if before.iter().flatten().all(Vec::is_empty) {
            return Ok(());
        }

        let parent_ids = ObjectType::ALL.map(|side| tuple.get(side).map(Record::id));
        let [local, synchronized, remote] = before.clone().map(Option::unwrap_or_default);
        let mut children = build_tuples(local, synchronized, remote, C::shares_identity, self.belongs);

        for child in &mut children {
            self.reconcile(context, tuple, &parent_ids, child)?;
        }

        self.rebuild(tuple, &before, &children);
        Ok(())
    }

    /// Make sure every present side has its collection loaded and return
    /// the children per side, in [`ObjectType::ALL`] order.
    fn load_children(
        &self,
        context: &Context,
        tuple: &mut SynchronizingTuple<P>,
    ) -> [Option<Vec<C>>; 3] {
        ObjectType::ALL.map(|side| {
            let parent = tuple.get_mut(side)?;
            let parent_id = parent.id();
            let slot = (self.link.children)(parent);
            if slot.is_none() {
                *slot = Some(if parent_id == 0 {
                    Vec::new()
                } else {
                    (self.link.load)(context, parent_id)
                });
            }
            slot.as_ref()
                .map(|links| links.iter().map(|link| (self.link.child)(link).clone()).collect())
        })
    }

    fn reconcile(
        &self,
        context: &mut Context,
        parent: &SynchronizingTuple<P>,
        parent_ids: &[Option<i64>; 3],
        child: &mut SynchronizingTuple<C>,
    ) -> Result<()> {
        match child.determine_action() {
            SynchronizingAction::Nothing => Ok(()),
            SynchronizingAction::AddToLocal => {
                let (Some(local_parent), Some(remote)) = (parent.local.as_ref(), child.remote.as_ref())
                else {
                    return Ok(());
                };
                let local = self
                    .attach
                    .and_then(|attach| attach(context, local_parent, remote))
                    .unwrap_or_else(|| remote.detached_copy());
                child.set(ObjectType::Local, Some(local));
                self.survive(context, child, ObjectType::Remote)
            }
            SynchronizingAction::AddToRemote => {
                if parent.remote.is_none() {
                    return Ok(());
                }
                let remote = child.local.as_ref().map(DetachedCopy::detached_copy);
                child.set(ObjectType::Remote, remote);
                self.survive(context, child, ObjectType::Local)
            }
            SynchronizingAction::Merge => self.survive(context, child, ObjectType::Local),
            SynchronizingAction::RemoveFromLocal => self.remove_local(context, parent_ids, child),
            SynchronizingAction::RemoveFromRemote => self.remove_baseline(context, parent_ids, child),
        }
    }

    fn survive(
        &self,
        context: &mut Context,
        child: &mut SynchronizingTuple<C>,
        source: ObjectType,
    ) -> Result<()> {
        ensure_baseline(context, child, source);
        self.merger.merge(context, child)?;
        propagate_external_id(child);
        persist(context, child)
    }

    /// The remote side dropped the child: release it locally.
    fn remove_local(
        &self,
        context: &mut Context,
        parent_ids: &[Option<i64>; 3],
        child: &mut SynchronizingTuple<C>,
    ) -> Result<()> {
        let local = child.local.take();
        let synchronized = child.synchronized.take();
        child.mark_changed(ObjectType::Local);
        child.mark_changed(ObjectType::Synchronized);

        for (row, parent_id) in [(&local, parent_ids[0]), (&synchronized, parent_ids[1])] {
            if let (Some(row), Some(parent_id)) = (row, parent_id) {
                if row.id() != 0 && parent_id != 0 {
                    (self.detach)(context, parent_id, row)?;
                }
            }
        }

        let local_gone = local
            .as_ref()
            .map_or(true, |row| self.remove_if_orphaned(context, row));
        if local_gone && !C::SHARED_ROW {
            if let Some(row) = synchronized.as_ref() {
                self.remove_if_orphaned(context, row);
            }
        }
        Ok(())
    }

    /// The local side dropped the child: drop it remotely and release the baseline.
    fn remove_baseline(
        &self,
        context: &mut Context,
        parent_ids: &[Option<i64>; 3],
        child: &mut SynchronizingTuple<C>,
    ) -> Result<()> {
        child.set(ObjectType::Remote, None);
        let Some(synchronized) = child.synchronized.take() else {
            return Ok(());
        };
        child.mark_changed(ObjectType::Synchronized);

        let id = synchronized.id();
        if id == 0 {
            return Ok(());
        }
        if let Some(parent_id) = parent_ids[1].filter(|parent_id| *parent_id != 0) {
            (self.detach)(context, parent_id, &synchronized)?;
        }
        let mated = !C::SHARED_ROW && context.find::<C>(|row| row.mate_id() == Some(id)).is_some();
        if !mated {
            self.remove_if_orphaned(context, &synchronized);
        }
        Ok(())
    }

    /// Remove a released row unless the guard keeps it. Returns whether the
    /// row is gone.
    fn remove_if_orphaned(&self, context: &mut Context, row: &C) -> bool {
        let id = row.id();
        if id == 0 {
            return true;
        }
        let Some(current) = context.get::<C>(id).cloned() else {
            return true;
        };
        if self.needs_removal.map_or(true, |guard| guard(context, &current)) {
            context.remove::<C>(id);
            true
        } else {
            false
        }
    }

    fn rebuild(
        &self,
        tuple: &mut SynchronizingTuple<P>,
        before: &[Option<Vec<C>>; 3],
        children: &[SynchronizingTuple<C>],
    ) {
        let remote_children_changed = children.iter().any(SynchronizingTuple::remote_changed);

        for (index, side) in ObjectType::ALL.into_iter().enumerate() {
            let Some(parent) = tuple.get_mut(side) else {
                continue;
            };
            let parent_id = parent.id();

            let mut after: Vec<C> = Vec::new();
            for child in children.iter().filter_map(|child| child.get(side)) {
                if !contains_child(&after, child) {
                    after.push(child.clone());
                }
            }

            let previous = before[index].as_deref().unwrap_or_default();
            let changed = !same_membership(previous, &after)
                || (side == ObjectType::Remote && remote_children_changed);
            *(self.link.children)(parent) = Some(
                after
                    .into_iter()
                    .map(|child| (self.link.make_link)(parent_id, child))
                    .collect(),
            );
            if changed {
                tuple.mark_changed(side);
            }
        }
    }
}

fn contains_child<C: SyncEntity>(children: &[C], candidate: &C) -> bool {
    let id = candidate.id();
    children.iter().any(|child| {
        if id == 0 {
            child.id() == 0 && child.same_content(candidate)
        } else {
            child.id() == id
        }
    })
}

/// Same rows by id, or same content for rows without one.
fn same_membership<C: SyncEntity>(before: &[C], after: &[C]) -> bool {
    if before.len() != after.len() {
        return false;
    }
    let mut used = vec![false; before.len()];
    after.iter().all(|child| {
        let found = (0..before.len()).find(|&index| {
            let previous = &before[index];
            !used[index]
                && if child.id() == 0 {
                    previous.id() == 0 && previous.same_content(child)
                } else {
                    previous.id() == child.id()
                }
        });
        if let Some(index) = found {
            used[index] = true;
            true
        } else {
            false
        }
    })
}
