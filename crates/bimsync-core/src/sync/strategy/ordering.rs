//! Parents-before-children ordering of objective tuples

use std::collections::HashMap;

use crate::models::Objective;
use crate::sync::tuple::SynchronizingTuple;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Local(i64),
    Synchronized(i64),
    External(String),
}

fn keys(tuple: &SynchronizingTuple<Objective>) -> Vec<Key> {
    let mut keys = Vec::new();
    if let Some(local) = tuple.local.as_ref().filter(|local| local.id != 0) {
        keys.push(Key::Local(local.id));
    }
    if let Some(synced) = tuple.synchronized.as_ref().filter(|synced| synced.id != 0) {
        keys.push(Key::Synchronized(synced.id));
    }
    for objective in [&tuple.remote, &tuple.synchronized, &tuple.local].into_iter().flatten() {
        if let Some(external_id) = &objective.external_id {
            keys.push(Key::External(external_id.clone()));
        }
    }
    keys
}

fn parent_keys(tuple: &SynchronizingTuple<Objective>) -> Vec<Key> {
    let mut keys = Vec::new();
    if let Some(parent_id) = tuple.local.as_ref().and_then(|local| local.parent_objective_id) {
        keys.push(Key::Local(parent_id));
    }
    if let Some(parent_id) = tuple.synchronized.as_ref().and_then(|synced| synced.parent_objective_id) {
        keys.push(Key::Synchronized(parent_id));
    }
    for objective in [&tuple.remote, &tuple.local].into_iter().flatten() {
        if let Some(parent) = &objective.parent_external_id {
            keys.push(Key::External(parent.clone()));
        }
    }
    keys
}

/// Order tuples so that every parent objective comes before its children.
///
/// Input order is kept wherever the hierarchy allows it. Members of a
/// parent cycle are appended in input order.
pub fn order_by_parent(tuples: Vec<SynchronizingTuple<Objective>>) -> Vec<SynchronizingTuple<Objective>> {
    let mut index_of: HashMap<Key, usize> = HashMap::new();
    for (index, tuple) in tuples.iter().enumerate() {
        for key in keys(tuple) {
            index_of.entry(key).or_insert(index);
        }
    }

    let parents: Vec<Vec<usize>> = tuples
        .iter()
        .enumerate()
        .map(|(index, tuple)| {
            let mut parents: Vec<usize> = parent_keys(tuple)
                .iter()
                .filter_map(|key| index_of.get(key).copied())
                .filter(|parent| *parent != index)
                .collect();
            parents.sort_unstable();
            parents.dedup();
            parents
        })
        .collect();

    let mut emitted = vec![false; tuples.len()];
    let mut order = Vec::with_capacity(tuples.len());
    loop {
        let mut progressed = false;
        for index in 0..tuples.len() {
            if !emitted[index] && parents[index].iter().all(|parent| emitted[*parent]) {
                emitted[index] = true;
                order.push(index);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    if order.len() < tuples.len() {
        let cyclic = emitted.iter().filter(|done| !**done).count();
        tracing::warn!(cyclic, "Objective parent links form a cycle; keeping input order for them");
        order.extend((0..tuples.len()).filter(|index| !emitted[*index]));
    }

    let mut slots: Vec<Option<SynchronizingTuple<Objective>>> = tuples.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn remote(external_id: &str, parent: Option<&str>) -> SynchronizingTuple<Objective> {
        let mut objective = Objective::new(0, external_id);
        objective.external_id = Some(external_id.into());
        objective.parent_external_id = parent.map(str::to_string);
        SynchronizingTuple::new(None, None, Some(objective)).unwrap()
    }

    fn local(id: i64, parent: Option<i64>) -> SynchronizingTuple<Objective> {
        let mut objective = Objective::new(1, format!("local-{id}"));
        objective.id = id;
        objective.parent_objective_id = parent;
        SynchronizingTuple::new(Some(objective), None, None).unwrap()
    }

    fn titles(tuples: &[SynchronizingTuple<Objective>]) -> Vec<String> {
        tuples
            .iter()
            .map(|tuple| tuple.any_side().unwrap().title.clone())
            .collect()
    }

    #[test]
    fn parents_come_first() {
        let ordered = order_by_parent(vec![
            remote("ext-3", Some("ext-2")),
            remote("ext-2", Some("ext-1")),
            remote("ext-9", None),
            remote("ext-1", None),
        ]);
        assert_eq!(titles(&ordered), vec!["ext-9", "ext-1", "ext-2", "ext-3"]);
    }

    #[test]
    fn local_hierarchy_by_id() {
        let ordered = order_by_parent(vec![local(5, Some(4)), local(4, None)]);
        assert_eq!(titles(&ordered), vec!["local-4", "local-5"]);
    }

    #[test]
    fn unknown_parent_is_ignored() {
        let ordered = order_by_parent(vec![remote("ext-2", Some("ext-404")), remote("ext-1", None)]);
        assert_eq!(titles(&ordered), vec!["ext-2", "ext-1"]);
    }

    #[test]
    fn cycle_keeps_every_tuple() {
        let ordered = order_by_parent(vec![
            remote("ext-1", Some("ext-2")),
            remote("ext-2", Some("ext-1")),
            remote("ext-3", None),
        ]);
        assert_eq!(titles(&ordered), vec!["ext-3", "ext-1", "ext-2"]);
    }
}
