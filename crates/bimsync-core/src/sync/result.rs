//! Outcome of a failed synchronizing operation

use super::tuple::{ObjectType, SynchronizingTuple};
use crate::error::{Error, Result};

/// An entity whose operation failed, with the side it was taken from
#[derive(Debug)]
pub struct SynchronizingResult<T> {
    pub error: Error,
    pub object: Option<T>,
    pub object_type: ObjectType,
}

impl<T: Clone> SynchronizingResult<T> {
    pub fn new(error: Error, tuple: &SynchronizingTuple<T>, object_type: ObjectType) -> Self {
        Self {
            error,
            object: tuple.get(object_type).or_else(|| tuple.any_side()).cloned(),
            object_type,
        }
    }
}

/// Fold an operation outcome: cancellation propagates, every other error
/// becomes a [`SynchronizingResult`].
pub fn fold_outcome<T: Clone>(
    outcome: Result<()>,
    tuple: &SynchronizingTuple<T>,
    object_type: ObjectType,
) -> Result<Option<SynchronizingResult<T>>> {
    match outcome {
        Ok(()) => Ok(None),
        Err(error) if error.is_cancelled() => Err(error),
        Err(error) => {
            tracing::warn!(side = ?object_type, %error, "Synchronizing operation failed");
            Ok(Some(SynchronizingResult::new(error, tuple, object_type)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Item;

    #[test]
    fn cancellation_is_not_folded() {
        let tuple = SynchronizingTuple::new(Some(Item::new("/a.txt")), None, None).unwrap();
        let outcome = fold_outcome(Err(Error::Cancelled), &tuple, ObjectType::Local);
        assert!(outcome.unwrap_err().is_cancelled());
    }

    #[test]
    fn failures_carry_the_offending_side() {
        let tuple = SynchronizingTuple::new(None, None, Some(Item::new("/a.txt"))).unwrap();
        let result = fold_outcome(Err(Error::Remote("timeout".into())), &tuple, ObjectType::Remote)
            .unwrap()
            .unwrap();
        assert_eq!(result.object_type, ObjectType::Remote);
        assert_eq!(result.object.unwrap().relative_path, "/a.txt");
        assert!(matches!(result.error, Error::Remote(_)));
    }
}
