use crate::calc::classify::Thresholds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Neutral sub-score used when an input is missing or not a finite number.
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Readiness,
    Prospect,
    Leverage,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Readiness => "readiness",
            MetricKind::Prospect => "prospect",
            MetricKind::Leverage => "leverage",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Maps a 0..=100 weighted score linearly onto this range.
    pub fn from_unit_score(&self, score: f64) -> f64 {
        let unit = score.clamp(0.0, 100.0) / 100.0;
        self.clamp(self.min + (self.max - self.min) * unit)
    }
}

/// Static definition of one derived metric, validated at config load.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub kind: MetricKind,
    /// Source keys in priority order; the first snapshot providing a component wins.
    pub sources: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub range: MetricRange,
    pub thresholds: Option<Thresholds>,
    /// Value reported when none of the sources has ever produced a snapshot.
    pub baseline: f64,
}

impl MetricSpec {
    pub fn reads_source(&self, key: &str) -> bool {
        self.sources.iter().any(|s| s == key)
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub component: String,
    pub weight: f64,
    pub score: f64,
    pub defaulted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
    pub stale: bool,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Confidence in the oldest contributing snapshot, 0..=1.
    pub confidence: f64,
    pub breakdown: Vec<ScoreComponent>,
}
