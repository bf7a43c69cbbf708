//! Synchronizing tuples and action classification

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::SyncEquivalent;

/// One side of a synchronizing tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Local,
    Synchronized,
    Remote,
}

impl ObjectType {
    pub const ALL: [Self; 3] = [Self::Local, Self::Synchronized, Self::Remote];
}

/// What has to happen to one logical entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronizingAction {
    Nothing,
    Merge,
    AddToLocal,
    AddToRemote,
    RemoveFromLocal,
    RemoveFromRemote,
}

/// Classify a tuple from the sides present.
///
/// Local and remote without a baseline (matched by natural key) merge.
pub fn determine_action<T: SyncEquivalent>(
    local: Option<&T>,
    synchronized: Option<&T>,
    remote: Option<&T>,
) -> SynchronizingAction {
    match (local, synchronized, remote) {
        (None, None, Some(_)) => SynchronizingAction::AddToLocal,
        (Some(_), None, None) => SynchronizingAction::AddToRemote,
        (Some(local), Some(synchronized), Some(remote)) => {
            if local.same_content(synchronized) && remote.same_content(synchronized) {
                SynchronizingAction::Nothing
            } else {
                SynchronizingAction::Merge
            }
        }
        (Some(_), None, Some(_)) => SynchronizingAction::Merge,
        (None, Some(_), Some(_)) => SynchronizingAction::RemoveFromRemote,
        (Some(_), Some(_), None) => SynchronizingAction::RemoveFromLocal,
        (None, Some(_), None) | (None, None, None) => SynchronizingAction::Nothing,
    }
}

/// The local, synchronized-baseline and remote copies of one logical entity.
///
/// At least one side is present. The changed flags record which sides were
/// mutated while the tuple was processed and drive selective persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizingTuple<T> {
    pub local: Option<T>,
    pub synchronized: Option<T>,
    pub remote: Option<T>,
    local_changed: bool,
    synchronized_changed: bool,
    remote_changed: bool,
    baseline_synthesized: bool,
}

impl<T> SynchronizingTuple<T> {
    pub fn new(local: Option<T>, synchronized: Option<T>, remote: Option<T>) -> Result<Self> {
        if local.is_none() && synchronized.is_none() && remote.is_none() {
            return Err(Error::Invariant(
                "a synchronizing tuple needs at least one side".to_string(),
            ));
        }
        Ok(Self::from_sides(local, synchronized, remote))
    }

    pub(crate) const fn from_sides(
        local: Option<T>,
        synchronized: Option<T>,
        remote: Option<T>,
    ) -> Self {
        Self {
            local,
            synchronized,
            remote,
            local_changed: false,
            synchronized_changed: false,
            remote_changed: false,
            baseline_synthesized: false,
        }
    }

    pub const fn get(&self, side: ObjectType) -> Option<&T> {
        match side {
            ObjectType::Local => self.local.as_ref(),
            ObjectType::Synchronized => self.synchronized.as_ref(),
            ObjectType::Remote => self.remote.as_ref(),
        }
    }

    pub fn get_mut(&mut self, side: ObjectType) -> Option<&mut T> {
        match side {
            ObjectType::Local => self.local.as_mut(),
            ObjectType::Synchronized => self.synchronized.as_mut(),
            ObjectType::Remote => self.remote.as_mut(),
        }
    }

    pub fn set(&mut self, side: ObjectType, value: Option<T>) {
        match side {
            ObjectType::Local => self.local = value,
            ObjectType::Synchronized => self.synchronized = value,
            ObjectType::Remote => self.remote = value,
        }
        self.mark_changed(side);
    }

    /// Fill a side while building tuples, without marking it changed.
    pub(crate) fn place(&mut self, side: ObjectType, value: T) {
        match side {
            ObjectType::Local => self.local = Some(value),
            ObjectType::Synchronized => self.synchronized = Some(value),
            ObjectType::Remote => self.remote = Some(value),
        }
    }

    pub fn is_present(&self, side: ObjectType) -> bool {
        self.get(side).is_some()
    }

    /// First present side, preferring the baseline.
    pub fn any_side(&self) -> Option<&T> {
        self.synchronized
            .as_ref()
            .or(self.local.as_ref())
            .or(self.remote.as_ref())
    }

    pub fn mark_changed(&mut self, side: ObjectType) {
        match side {
            ObjectType::Local => self.local_changed = true,
            ObjectType::Synchronized => self.synchronized_changed = true,
            ObjectType::Remote => self.remote_changed = true,
        }
    }

    pub const fn is_changed(&self, side: ObjectType) -> bool {
        match side {
            ObjectType::Local => self.local_changed,
            ObjectType::Synchronized => self.synchronized_changed,
            ObjectType::Remote => self.remote_changed,
        }
    }

    pub const fn local_changed(&self) -> bool {
        self.local_changed
    }

    pub const fn synchronized_changed(&self) -> bool {
        self.synchronized_changed
    }

    pub const fn remote_changed(&self) -> bool {
        self.remote_changed
    }

    /// Install a baseline created during this run. Field merges then treat
    /// the tuple as having no baseline.
    pub(crate) fn synthesize_baseline(&mut self, baseline: T) {
        self.synchronized = Some(baseline);
        self.synchronized_changed = true;
        self.baseline_synthesized = true;
    }

    pub(crate) const fn has_real_baseline(&self) -> bool {
        self.synchronized.is_some() && !self.baseline_synthesized
    }

    /// `∅/S/∅`: only a baseline is left.
    pub const fn is_stale(&self) -> bool {
        self.local.is_none() && self.synchronized.is_some() && self.remote.is_none()
    }
}

impl<T: SyncEquivalent> SynchronizingTuple<T> {
    pub fn determine_action(&self) -> SynchronizingAction {
        determine_action(
            self.local.as_ref(),
            self.synchronized.as_ref(),
            self.remote.as_ref(),
        )
    }
}
