//! Change-tracked row storage

use std::collections::{BTreeMap, BTreeSet};

fn set_membership<K: Ord>(set: &mut BTreeSet<K>, key: K, present: bool) {
    if present {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}

/// State of a row before its first change since the checkpoint
#[derive(Debug, Clone)]
struct RowState<T> {
    row: Option<T>,
    dirty: bool,
    removed: bool,
}

/// Undo journal of a table
#[derive(Debug, Clone)]
struct Journal<T> {
    next_id: i64,
    rows: BTreeMap<i64, RowState<T>>,
}

/// Rows of one entity type keyed by id, with staged-change tracking
#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
    dirty: BTreeSet<i64>,
    removed: BTreeSet<i64>,
    journal: Option<Journal<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
            journal: None,
        }
    }
}

impl<T: Clone> Table<T> {
    /// Record the state of `id` the first time it changes after a checkpoint.
    fn touch(&mut self, id: i64) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if !journal.rows.contains_key(&id) {
            let state = RowState {
                row: self.rows.get(&id).cloned(),
                dirty: self.dirty.contains(&id),
                removed: self.removed.contains(&id),
            };
            journal.rows.insert(id, state);
        }
    }

    /// Start journaling changes. Replaces an earlier checkpoint.
    pub(crate) fn checkpoint(&mut self) {
        self.journal = Some(Journal {
            next_id: self.next_id,
            rows: BTreeMap::new(),
        });
    }

    /// Undo every change made since the checkpoint.
    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        self.next_id = journal.next_id;
        for (id, state) in journal.rows {
            match state.row {
                Some(row) => {
                    self.rows.insert(id, row);
                }
                None => {
                    self.rows.remove(&id);
                }
            }
            set_membership(&mut self.dirty, id, state.dirty);
            set_membership(&mut self.removed, id, state.removed);
        }
    }

    /// Keep the changes made since the checkpoint and stop journaling.
    pub(crate) fn release(&mut self) {
        self.journal = None;
    }

    /// Store a new row under a freshly allocated id.
    pub(crate) fn insert(&mut self, row: T) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.touch(id);
        self.rows.insert(id, row);
        self.dirty.insert(id);
        self.removed.remove(&id);
        id
    }

    /// Replace an existing row. Returns `false` when the id is unknown.
    pub(crate) fn put(&mut self, id: i64, row: T) -> bool {
        if self.rows.contains_key(&id) {
            self.touch(id);
        }
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                self.dirty.insert(id);
                true
            }
            None => false,
        }
    }

    /// Mutate a stored row in place.
    pub(crate) fn modify(&mut self, id: i64, change: impl FnOnce(&mut T)) -> bool {
        if self.rows.contains_key(&id) {
            self.touch(id);
        }
        match self.rows.get_mut(&id) {
            Some(row) => {
                change(row);
                self.dirty.insert(id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn delete(&mut self, id: i64) -> Option<T> {
        if self.rows.contains_key(&id) {
            self.touch(id);
        }
        let row = self.rows.remove(&id)?;
        self.dirty.remove(&id);
        self.removed.insert(id);
        Some(row)
    }

    /// Store a row read from persistent storage without marking it dirty.
    pub(crate) fn hydrate(&mut self, id: i64, row: T) {
        self.next_id = self.next_id.max(id + 1);
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn rows(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty() || !self.removed.is_empty()
    }

    /// Staged changes: rows to upsert and ids to delete.
    pub(crate) fn staged_changes(&self) -> TableChanges<T> {
        TableChanges {
            upserted: self
                .dirty
                .iter()
                .filter_map(|id| self.rows.get(id).cloned())
                .collect(),
            removed: self.removed.iter().copied().collect(),
        }
    }

    pub(crate) fn clear_changes(&mut self) {
        self.dirty.clear();
        self.removed.clear();
    }

}

/// Staged changes of one table
#[derive(Debug, Clone)]
pub struct TableChanges<T> {
    pub upserted: Vec<T>,
    pub removed: Vec<i64>,
}

impl<T> TableChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

/// State of a join record before its first change since the checkpoint
#[derive(Debug, Clone, Copy)]
struct LinkState {
    linked: bool,
    added: bool,
    removed: bool,
}

/// Join records between two tables, with staged-change tracking
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    links: BTreeSet<(i64, i64)>,
    added: BTreeSet<(i64, i64)>,
    removed: BTreeSet<(i64, i64)>,
    journal: Option<BTreeMap<(i64, i64), LinkState>>,
}

impl LinkTable {
    fn touch(&mut self, key: (i64, i64)) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if !journal.contains_key(&key) {
            let state = LinkState {
                linked: self.links.contains(&key),
                added: self.added.contains(&key),
                removed: self.removed.contains(&key),
            };
            journal.insert(key, state);
        }
    }

    pub(crate) fn checkpoint(&mut self) {
        self.journal = Some(BTreeMap::new());
    }

    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (key, state) in journal {
            set_membership(&mut self.links, key, state.linked);
            set_membership(&mut self.added, key, state.added);
            set_membership(&mut self.removed, key, state.removed);
        }
    }

    pub(crate) fn release(&mut self) {
        self.journal = None;
    }

    pub(crate) fn link(&mut self, parent: i64, child: i64) -> bool {
        if self.links.contains(&(parent, child)) {
            return false;
        }
        self.touch((parent, child));
        self.links.insert((parent, child));
        if !self.removed.remove(&(parent, child)) {
            self.added.insert((parent, child));
        }
        true
    }

    pub(crate) fn unlink(&mut self, parent: i64, child: i64) -> bool {
        if !self.links.contains(&(parent, child)) {
            return false;
        }
        self.touch((parent, child));
        self.links.remove(&(parent, child));
        if !self.added.remove(&(parent, child)) {
            self.removed.insert((parent, child));
        }
        true
    }

    pub(crate) fn hydrate(&mut self, parent: i64, child: i64) {
        self.links.insert((parent, child));
    }

    pub fn contains(&self, parent: i64, child: i64) -> bool {
        self.links.contains(&(parent, child))
    }

    pub fn children_of(&self, parent: i64) -> Vec<i64> {
        self.links
            .range((parent, i64::MIN)..=(parent, i64::MAX))
            .map(|(_, child)| *child)
            .collect()
    }

    pub fn parents_of(&self, child: i64) -> Vec<i64> {
        self.links
            .iter()
            .filter(|(_, linked)| *linked == child)
            .map(|(parent, _)| *parent)
            .collect()
    }

    /// Make the children of `parent` exactly `children`.
    pub(crate) fn replace_children(&mut self, parent: i64, children: &[i64]) {
        for existing in self.children_of(parent) {
            if !children.contains(&existing) {
                self.unlink(parent, existing);
            }
        }
        for child in children {
            self.link(parent, *child);
        }
    }

    pub(crate) fn remove_parent(&mut self, parent: i64) {
        for child in self.children_of(parent) {
            self.unlink(parent, child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: i64) {
        for parent in self.parents_of(child) {
            self.unlink(parent, child);
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub(crate) fn staged_changes(&self) -> LinkChanges {
        LinkChanges {
            added: self.added.iter().copied().collect(),
            removed: self.removed.iter().copied().collect(),
        }
    }

    pub(crate) fn clear_changes(&mut self) {
        self.added.clear();
        self.removed.clear();
    }

}

/// Staged changes of one join table
#[derive(Debug, Clone, Default)]
pub struct LinkChanges {
    pub added: Vec<(i64, i64)>,
    pub removed: Vec<(i64, i64)>,
}
