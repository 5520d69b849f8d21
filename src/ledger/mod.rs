//! Durable record of item ids that have already been notified.
//!
//! The record is read once per run and replaced (never appended) by a single
//! commit holding the union of the prior ids and the newly notified ones.

pub mod file;

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerReadError, LedgerWriteError};

/// Set of notified item ids. Ordered so persisted records diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifiedSet(BTreeSet<u64>);

impl NotifiedSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: u64) -> bool {
        self.0.insert(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }

    pub fn union(&self, other: &NotifiedSet) -> NotifiedSet {
        NotifiedSet(self.0.union(&other.0).copied().collect())
    }

    pub fn is_superset(&self, other: &NotifiedSet) -> bool {
        self.0.is_superset(&other.0)
    }
}

impl FromIterator<u64> for NotifiedSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        NotifiedSet(iter.into_iter().collect())
    }
}

impl Extend<u64> for NotifiedSet {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Ids already notified. A record that does not exist yet is an empty set.
    async fn already_notified_ids(&self) -> Result<NotifiedSet, LedgerReadError>;

    /// Replace the record with `full`. Callers pass the union of old and new ids.
    async fn commit_notified_ids(&self, full: &NotifiedSet) -> Result<(), LedgerWriteError>;

    fn name(&self) -> &'static str;
}

// --- Test helper ---

/// In-memory ledger that remembers every commit it received.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    current: Mutex<NotifiedSet>,
    pub commits: Mutex<Vec<NotifiedSet>>,
    fail_read: bool,
    fail_write: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I: IntoIterator<Item = u64>>(ids: I) -> Self {
        Self {
            current: Mutex::new(ids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_read = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn snapshot(&self) -> NotifiedSet {
        lock(&self.current).clone()
    }

    pub fn commit_count(&self) -> usize {
        lock(&self.commits).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

#[async_trait]
impl NotificationLedger for MemoryLedger {
    async fn already_notified_ids(&self) -> Result<NotifiedSet, LedgerReadError> {
        if self.fail_read {
            return Err(LedgerReadError::Backend("memory ledger read disabled".into()));
        }
        Ok(self.snapshot())
    }

    async fn commit_notified_ids(&self, full: &NotifiedSet) -> Result<(), LedgerWriteError> {
        lock(&self.commits).push(full.clone());
        if self.fail_write {
            return Err(LedgerWriteError::Backend("memory ledger write disabled".into()));
        }
        *lock(&self.current) = full.clone();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
