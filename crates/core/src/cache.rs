use crate::domain::snapshot::Snapshot;
use crate::domain::source::Source;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

type Slot = Arc<Mutex<Option<Snapshot>>>;

/// Last-known-good snapshot per source key. Each key has its own mutex, so a
/// `put` replaces the whole snapshot in one step and readers never see a mix
/// of old and new.
#[derive(Debug)]
pub struct SnapshotCache {
    max_ages: HashMap<String, Duration>,
    default_max_age: Duration,
    slots: RwLock<HashMap<String, Slot>>,
}

impl SnapshotCache {
    pub fn new(sources: &[Source]) -> Self {
        Self {
            max_ages: sources
                .iter()
                .map(|s| (s.key.clone(), s.max_age))
                .collect(),
            default_max_age: DEFAULT_MAX_AGE,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_age(&self, key: &str) -> Duration {
        self.max_ages
            .get(key)
            .copied()
            .unwrap_or(self.default_max_age)
    }

    pub fn get(&self, key: &str) -> Option<Snapshot> {
        self.get_at(key, Utc::now())
    }

    /// Returns the snapshot for `key`, flagged stale when older than the
    /// source's max age at `now`.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Snapshot> {
        let slot = self.existing_slot(key)?;
        let snapshot = slot.lock().unwrap_or_else(PoisonError::into_inner).clone()?;
        if self.is_expired(key, &snapshot, now) {
            return Some(snapshot.demoted());
        }
        Some(snapshot)
    }

    pub fn put(&self, key: &str, payload: Value, fetched_at: DateTime<Utc>) -> Snapshot {
        let snapshot = Snapshot::new(key, payload, fetched_at);
        let slot = self.slot(key);
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        snapshot
    }

    /// Demotes the stored snapshot to stale. Returns `false` when there is none.
    pub fn mark_stale(&self, key: &str) -> bool {
        let Some(slot) = self.existing_slot(key) else {
            return false;
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(snapshot) => {
                *guard = Some(snapshot.demoted());
                true
            }
            None => false,
        }
    }

    pub fn snapshots_for(&self, keys: &[String], now: DateTime<Utc>) -> BTreeMap<String, Snapshot> {
        keys.iter()
            .filter_map(|key| self.get_at(key, now).map(|s| (key.clone(), s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, key: &str, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        let max_age = chrono::Duration::from_std(self.max_age(key)).unwrap_or(chrono::Duration::MAX);
        snapshot.age(now) > max_age
    }

    fn existing_slot(&self, key: &str) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.existing_slot(key) {
            return slot;
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}
