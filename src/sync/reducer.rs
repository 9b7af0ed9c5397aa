//! Keyed, newest-first collection fed by two sources: direct responses to
//! our own mutations and push events from the platform. Either may arrive
//! first, and either may arrive twice.

use std::collections::HashSet;

use crate::models::task::{Task, TaskChange};

pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Task {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    LocalOptimistic,
    ServerConfirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Insert(T),
    Update(T),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub origin: Origin,
    pub change: Change<T>,
}

impl<T> Tagged<T> {
    pub fn confirmed(change: Change<T>) -> Self {
        Self {
            origin: Origin::ServerConfirmed,
            change,
        }
    }

    pub fn optimistic(change: Change<T>) -> Self {
        Self {
            origin: Origin::LocalOptimistic,
            change,
        }
    }
}

impl From<TaskChange> for Tagged<Task> {
    fn from(change: TaskChange) -> Self {
        Tagged::confirmed(match change {
            TaskChange::Insert(task) => Change::Insert(task),
            TaskChange::Update(task) => Change::Update(task),
            TaskChange::Delete(task) => Change::Delete(task.id),
        })
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    row: T,
    origin: Origin,
}

#[derive(Debug, Clone)]
pub struct Collection<T> {
    rows: Vec<Entry<T>>,
    tombstones: HashSet<String>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            tombstones: HashSet::new(),
        }
    }
}

impl<T: Keyed + Clone + PartialEq> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with a server snapshot, already newest first.
    pub fn reset(&mut self, rows: Vec<T>) {
        for row in &rows {
            self.tombstones.remove(row.key());
        }
        self.rows = rows
            .into_iter()
            .map(|row| Entry {
                row,
                origin: Origin::ServerConfirmed,
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.tombstones.clear();
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.rows.iter().position(|e| e.row.key() == key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.position(key).map(|i| &self.rows[i].row)
    }

    pub fn is_confirmed(&self, key: &str) -> bool {
        self.position(key)
            .is_some_and(|i| self.rows[i].origin == Origin::ServerConfirmed)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().map(|e| &e.row)
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Returns whether the collection changed.
    pub fn apply(&mut self, event: Tagged<T>) -> bool {
        let Tagged { origin, change } = event;
        match change {
            Change::Insert(row) => match self.position(row.key()) {
                Some(i) if origin == Origin::ServerConfirmed => self.replace(i, row, origin),
                Some(_) => false,
                None if self.tombstones.contains(row.key()) => false,
                None => {
                    self.rows.insert(0, Entry { row, origin });
                    true
                }
            },
            Change::Update(row) => match self.position(row.key()) {
                Some(i) => {
                    let entry = &self.rows[i];
                    if origin == Origin::LocalOptimistic
                        && entry.origin == Origin::ServerConfirmed
                        && entry.row == row
                    {
                        return false;
                    }
                    self.replace(i, row, origin)
                }
                None => false,
            },
            Change::Delete(key) => {
                self.tombstones.insert(key.clone());
                match self.position(&key) {
                    Some(i) => {
                        self.rows.remove(i);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn replace(&mut self, i: usize, row: T, origin: Origin) -> bool {
        let entry = &mut self.rows[i];
        let changed = entry.row != row || entry.origin != origin;
        entry.row = row;
        entry.origin = origin;
        changed
    }
}
