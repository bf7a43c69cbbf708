//! Data models for bimsync
//!
//! Every persisted entity carries a numeric `id` (`0` until the unit of work
//! assigns one). Synchronizable entities additionally carry the identity
//! assigned by the remote system, the mate reference pairing a local row with
//! its synchronized-baseline row, and the synchronized flag.

mod bim_element;
mod dynamic_field;
mod item;
mod objective;
mod project;
mod user;

pub use bim_element::{BimElement, BimElementObjective};
pub use dynamic_field::{DynamicField, FieldKind, FieldValue};
pub use item::{Item, ItemType, ObjectiveItem};
pub use objective::{Objective, ObjectiveStatus};
pub use project::Project;
pub use user::User;

/// An entity that can exist locally, as a synchronized baseline and remotely.
pub trait Synchronizable {
    /// Identity assigned by the remote system.
    fn external_id(&self) -> Option<&str>;
    fn set_external_id(&mut self, external_id: Option<String>);
    /// Id of the synchronized-baseline row paired with this local row.
    fn synchronization_mate_id(&self) -> Option<i64>;
    fn set_synchronization_mate_id(&mut self, mate_id: Option<i64>);
    /// `true` for synchronized-baseline rows.
    fn is_synchronized(&self) -> bool;
    fn set_synchronized(&mut self, is_synchronized: bool);
    /// Last update timestamp (Unix ms).
    fn updated_at(&self) -> i64;
}

/// Comparison of synchronized content, ignoring storage identity.
///
/// Ids, mates, synchronized flags, timestamps and the entity's own external
/// id never take part. Child collections are compared only when both sides
/// have them loaded.
pub trait SyncEquivalent {
    fn same_content(&self, other: &Self) -> bool;
}

/// Produces a not-yet-persisted copy of an entity's content.
///
/// Used to create a missing side of a tuple. Child collections start loaded
/// and empty; the children mergers fill them.
pub trait DetachedCopy {
    #[must_use]
    fn detached_copy(&self) -> Self;
}

macro_rules! impl_synchronizable {
    ($entity:ty) => {
        impl $crate::models::Synchronizable for $entity {
            fn external_id(&self) -> Option<&str> {
                self.external_id.as_deref()
            }

            fn set_external_id(&mut self, external_id: Option<String>) {
                self.external_id = external_id;
            }

            fn synchronization_mate_id(&self) -> Option<i64> {
                self.synchronization_mate_id
            }

            fn set_synchronization_mate_id(&mut self, mate_id: Option<i64>) {
                self.synchronization_mate_id = mate_id;
            }

            fn is_synchronized(&self) -> bool {
                self.is_synchronized
            }

            fn set_synchronized(&mut self, is_synchronized: bool) {
                self.is_synchronized = is_synchronized;
            }

            fn updated_at(&self) -> i64 {
                self.updated_at
            }
        }
    };
}

pub(crate) use impl_synchronizable;

/// Unordered comparison of two collections by content.
pub fn same_content_multiset<T: SyncEquivalent>(left: &[T], right: &[T]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut used = vec![false; right.len()];
    left.iter().all(|candidate| {
        let found = right
            .iter()
            .enumerate()
            .find(|(index, other)| !used[*index] && candidate.same_content(other));
        if let Some((index, _)) = found {
            used[index] = true;
            true
        } else {
            false
        }
    })
}

/// Compares two optional child collections; unloaded collections are not compared.
pub fn same_loaded_children<T: SyncEquivalent>(
    left: Option<&Vec<T>>,
    right: Option<&Vec<T>>,
) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => same_content_multiset(left, right),
        _ => true,
    }
}
