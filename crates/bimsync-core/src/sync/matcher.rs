//! Pairs up local, synchronized and remote collections into tuples

use super::tuple::{ObjectType, SynchronizingTuple};

/// Build one tuple per logical entity.
///
/// Members are placed side by side, baseline first. Each member joins the
/// first tuple whose matching side is still empty and that `identity`
/// accepts; members left over are folded into a tuple through the
/// natural-key predicate `belongs`, or start a tuple of their own.
pub fn build_tuples<T>(
    local: Vec<T>,
    synchronized: Vec<T>,
    remote: Vec<T>,
    identity: impl Fn(&SynchronizingTuple<T>, &T) -> bool,
    belongs: impl Fn(&SynchronizingTuple<T>, &T) -> bool,
) -> Vec<SynchronizingTuple<T>> {
    let mut tuples: Vec<SynchronizingTuple<T>> = Vec::new();

    for (side, members) in [
        (ObjectType::Synchronized, synchronized),
        (ObjectType::Local, local),
        (ObjectType::Remote, remote),
    ] {
        let mut unmatched = Vec::new();
        for member in members {
            match tuples
                .iter_mut()
                .find(|tuple| !tuple.is_present(side) && identity(tuple, &member))
            {
                Some(tuple) => tuple.place(side, member),
                None => unmatched.push(member),
            }
        }

        let first_new = tuples.len();
        for member in unmatched {
            match tuples[..first_new]
                .iter_mut()
                .find(|tuple| !tuple.is_present(side) && belongs(tuple, &member))
            {
                Some(tuple) => tuple.place(side, member),
                None => {
                    let mut tuple = SynchronizingTuple::from_sides(None, None, None);
                    tuple.place(side, member);
                    tuples.push(tuple);
                }
            }
        }
    }

    tuples
}

/// Natural-key predicate that never matches.
pub const fn no_natural_key<T>(_tuple: &SynchronizingTuple<T>, _candidate: &T) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BimElement, Item};
    use crate::sync::entity::SyncEntity;
    use crate::sync::tuple::SynchronizingAction;
    use pretty_assertions::assert_eq;

    fn item(id: i64, path: &str) -> Item {
        let mut item = Item::new(path);
        item.id = id;
        item
    }

    fn by_path(tuple: &SynchronizingTuple<Item>, candidate: &Item) -> bool {
        tuple.any_side().is_some_and(|item| item.same_path(candidate))
    }

    #[test]
    fn pairs_by_mate_and_external_id() {
        let mut synced = item(1, "/a.txt");
        synced.is_synchronized = true;
        synced.external_id = Some("ext-1".into());
        let mut local = item(2, "/a.txt");
        local.synchronization_mate_id = Some(1);
        let mut remote = item(0, "/a.txt");
        remote.external_id = Some("ext-1".into());

        let tuples = build_tuples(
            vec![local],
            vec![synced],
            vec![remote],
            Item::shares_identity,
            no_natural_key,
        );
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].determine_action(), SynchronizingAction::Nothing);
    }

    #[test]
    fn unmatched_members_get_own_tuples() {
        let tuples = build_tuples(
            vec![item(1, "/local.txt")],
            Vec::new(),
            vec![item(0, "/remote.txt")],
            Item::shares_identity,
            by_path,
        );
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].determine_action(), SynchronizingAction::AddToRemote);
        assert_eq!(tuples[1].determine_action(), SynchronizingAction::AddToLocal);
    }

    #[test]
    fn natural_key_folds_remote_member() {
        let tuples = build_tuples(
            vec![item(1, "/a.txt")],
            Vec::new(),
            vec![item(0, "/a.txt"), item(0, "/b.txt")],
            Item::shares_identity,
            by_path,
        );
        assert_eq!(tuples.len(), 2);
        assert!(tuples[0].local.is_some() && tuples[0].remote.is_some());
        assert!(tuples[1].local.is_none());
    }

    #[test]
    fn identity_wins_over_natural_key() {
        let mut synced = item(1, "/old.txt");
        synced.is_synchronized = true;
        synced.external_id = Some("ext-1".into());
        let mut renamed = item(0, "/a.txt");
        renamed.external_id = Some("ext-1".into());

        let tuples = build_tuples(
            vec![item(2, "/a.txt")],
            vec![synced],
            vec![renamed],
            Item::shares_identity,
            by_path,
        );
        // the local /a.txt is not mated, so it must not steal the renamed remote
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0].remote.as_ref().map(|item| item.relative_path.as_str()), Some("/a.txt"));
        assert!(tuples[0].synchronized.is_some());
        assert!(tuples[1].remote.is_none());
    }

    #[test]
    fn bim_elements_match_parent_name_case_insensitively() {
        let mut shared = BimElement::new("0K7w7JN$P8GxNFIPhzbTWx", "Tower.IFC");
        shared.id = 5;
        let remote = BimElement::new("0K7w7JN$P8GxNFIPhzbTWx", "tower.ifc");

        let tuples = build_tuples(
            vec![shared.clone()],
            vec![shared],
            vec![remote],
            BimElement::shares_identity,
            |tuple, candidate| tuple.any_side().is_some_and(|element| element.same_element(candidate)),
        );
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0].determine_action(), SynchronizingAction::Nothing);
    }
}
