//! Three-way synchronization engine
//!
//! Every logical entity is seen as a [`SynchronizingTuple`] of its local
//! copy, its synchronized baseline and its remote copy. The tuple decides
//! a [`SynchronizingAction`]; a per-entity strategy carries it out, with
//! field-level merges and nested reconciliation of child collections. The
//! [`Synchronizer`] drives a whole run.

pub mod children;
pub mod children_mergers;
pub mod entity;
pub mod external_ids;
pub mod matcher;
pub mod merger;
pub mod result;
pub mod strategy;
pub mod synchronizer;
#[cfg(test)]
pub(crate) mod test_support;
pub mod tuple;

pub use entity::SyncEntity;
pub use merger::{
    BimElementMerger, DynamicFieldMerger, ItemMerger, Merger, ObjectiveMerger, ProjectMerger,
};
pub use result::SynchronizingResult;
pub use strategy::{ObjectiveStrategy, ProjectStrategy, SynchronizationStrategy};
pub use synchronizer::{EntityReport, FailureRecord, SyncReport, Synchronizer};
pub use tuple::{determine_action, ObjectType, SynchronizingAction, SynchronizingTuple};
