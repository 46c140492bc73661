use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Last known good payload for a source. The payload is shared and never mutated;
/// a later fetch produces a new `Snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub source_key: String,
    pub payload: Arc<Value>,
    pub fetched_at: DateTime<Utc>,
    pub freshness: Freshness,
}

impl Snapshot {
    pub fn new(source_key: impl Into<String>, payload: Value, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_key: source_key.into(),
            payload: Arc::new(payload),
            fetched_at,
            freshness: Freshness::Fresh,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.fetched_at)
    }

    pub(crate) fn demoted(mut self) -> Self {
        self.freshness = Freshness::Stale;
        self
    }
}
