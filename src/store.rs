use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::record::Record;

/// An immutable, fully built view of one record kind.
///
/// Snapshots are only ever replaced whole. The category set is derived from
/// the records that survived deduplication, so a category never outlives the
/// last record carrying it.
#[derive(Debug, Clone)]
pub struct Snapshot<R> {
    records: HashMap<String, R>,
    categories: BTreeSet<String>,
    loaded_at: Option<DateTime<Utc>>,
}

impl<R: Record> Snapshot<R> {
    /// The placeholder a store holds before its first scan.
    pub fn unloaded() -> Self {
        Self {
            records: HashMap::new(),
            categories: BTreeSet::new(),
            loaded_at: None,
        }
    }

    /// Builds a snapshot from records in scan order. On identifier collision
    /// the later record replaces the earlier one.
    pub fn build(records: impl IntoIterator<Item = R>, loaded_at: DateTime<Utc>) -> Self {
        let mut by_id: HashMap<String, R> = HashMap::new();
        for record in records {
            if !record.is_complete() {
                continue;
            }
            by_id.insert(record.id().to_string(), record);
        }
        let categories = by_id
            .values()
            .map(|record| record.category().to_string())
            .collect();
        Self {
            records: by_id,
            categories,
            loaded_at: Some(loaded_at),
        }
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.records.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

/// Holds the live snapshot for one record kind.
///
/// Readers take the read lock only long enough to clone the `Arc`, then query
/// the snapshot lock-free. A replacement takes the write lock for the pointer
/// swap, so every reader sees either the old snapshot or the new one.
pub struct RecordStore<R> {
    current: RwLock<Arc<Snapshot<R>>>,
}

impl<R: Record> RecordStore<R> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::unloaded())),
        }
    }

    /// Installs `snapshot` and returns the one it replaced.
    pub fn replace_snapshot(&self, snapshot: Snapshot<R>) -> Arc<Snapshot<R>> {
        let next = Arc::new(snapshot);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, next)
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot<R>> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// `None` until the first snapshot is installed.
    pub fn last_load_time(&self) -> Option<DateTime<Utc>> {
        self.current_snapshot().loaded_at()
    }
}

impl<R: Record> Default for RecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}
