//! Core types for reconciliation

use std::fmt;

/// Classification of an entity within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    /// Desired but not known to exist remotely
    New,
    /// Desired and remote, with differing fields
    Updated,
    /// Desired and remote agree
    Equal,
    /// Remote only
    Old,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Updated => "Updated",
            Self::Equal => "Equal",
            Self::Old => "Old",
        }
    }

    /// Whether this entity came from the backend and has not met a desired counterpart.
    pub fn is_observed(self) -> bool {
        self == Self::Old
    }

    /// Whether applying this entity issues a write.
    pub fn is_change(self) -> bool {
        self != Self::Equal
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value tagged with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    pub state: State,
    pub value: T,
}

impl<T> Tracked<T> {
    pub fn new(state: State, value: T) -> Self {
        Self { state, value }
    }

    pub fn desired(value: T) -> Self {
        Self::new(State::New, value)
    }

    pub fn observed(value: T) -> Self {
        Self::new(State::Old, value)
    }
}

/// Entities of one kind partitioned by classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets<T> {
    pub new: Vec<T>,
    pub updated: Vec<T>,
    pub equal: Vec<T>,
    pub old: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            new: Vec::new(),
            updated: Vec::new(),
            equal: Vec::new(),
            old: Vec::new(),
        }
    }
}

impl<T> Buckets<T> {
    pub fn push(&mut self, state: State, value: T) {
        match state {
            State::New => self.new.push(value),
            State::Updated => self.updated.push(value),
            State::Equal => self.equal.push(value),
            State::Old => self.old.push(value),
        }
    }

    pub fn get(&self, state: State) -> &[T] {
        match state {
            State::New => &self.new,
            State::Updated => &self.updated,
            State::Equal => &self.equal,
            State::Old => &self.old,
        }
    }

    pub fn total(&self) -> usize {
        self.new.len() + self.updated.len() + self.equal.len() + self.old.len()
    }

    /// Number of entities that are new or updated.
    pub fn pending(&self) -> usize {
        self.new.len() + self.updated.len()
    }
}

/// Summary of an apply pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ApplySummary {
    /// Total number of backend objects written
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check whether the backend already matched
    pub fn is_converged(&self) -> bool {
        self.total_changes() == 0
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ApplySummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
    }
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged",
            self.created, self.updated, self.deleted, self.unchanged
        )
    }
}
