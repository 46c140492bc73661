//! Derived-metric calculation.
//!
//! Every metric is a weighted sum of 0..=100 sub-scores read from cached
//! snapshots, mapped onto the metric's range. Missing or non-finite inputs use
//! [`NEUTRAL_SCORE`]; nothing in here returns an error or panics on bad data.

pub mod classify;
pub mod decay;
pub mod leverage;
pub mod prospect;
pub mod readiness;

use crate::calc::classify::Thresholds;
use crate::calc::decay::ConfidenceDecay;
use crate::domain::metric::{
    DerivedMetric, MetricKind, MetricRange, MetricSpec, ScoreComponent, NEUTRAL_SCORE,
};
use crate::domain::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

impl MetricKind {
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            MetricKind::Readiness => readiness::COMPONENTS,
            MetricKind::Prospect => prospect::COMPONENTS,
            MetricKind::Leverage => leverage::COMPONENTS,
        }
    }

    pub fn default_weights(&self) -> BTreeMap<String, f64> {
        let table = match self {
            MetricKind::Readiness => readiness::DEFAULT_WEIGHTS,
            MetricKind::Prospect => prospect::DEFAULT_WEIGHTS,
            MetricKind::Leverage => leverage::DEFAULT_WEIGHTS,
        };
        table.iter().map(|(k, w)| (k.to_string(), *w)).collect()
    }

    pub fn default_range(&self) -> MetricRange {
        match self {
            MetricKind::Readiness | MetricKind::Prospect => MetricRange::new(0.0, 100.0),
            MetricKind::Leverage => MetricRange::new(0.5, 5.0),
        }
    }

    pub fn default_thresholds(&self) -> Option<Thresholds> {
        match self {
            MetricKind::Prospect => Some(classify::prospect_thresholds()),
            MetricKind::Readiness | MetricKind::Leverage => None,
        }
    }

    fn sub_score(&self, component: &str, payload: &Value) -> Option<f64> {
        match self {
            MetricKind::Readiness => readiness::sub_score(component, payload),
            MetricKind::Prospect => prospect::sub_score(component, payload),
            MetricKind::Leverage => leverage::sub_score(component, payload),
        }
    }
}

/// Holds the configured metric specs and computes them on demand.
#[derive(Debug, Clone)]
pub struct Calculator {
    specs: Vec<MetricSpec>,
    decay: ConfidenceDecay,
}

impl Calculator {
    pub fn new(specs: Vec<MetricSpec>) -> Self {
        Self {
            specs,
            decay: ConfidenceDecay::default(),
        }
    }

    pub fn with_decay(mut self, decay: ConfidenceDecay) -> Self {
        self.decay = decay;
        self
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    pub fn spec(&self, name: &str) -> Option<&MetricSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn metrics_for_source<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a MetricSpec> {
        self.specs.iter().filter(move |s| s.reads_source(key))
    }

    pub fn decay(&self) -> &ConfidenceDecay {
        &self.decay
    }

    /// Returns `None` only for a metric name that was never configured.
    pub fn compute(
        &self,
        metric_name: &str,
        snapshots: &BTreeMap<String, Snapshot>,
        at: DateTime<Utc>,
    ) -> Option<DerivedMetric> {
        self.spec(metric_name)
            .map(|spec| compute(spec, snapshots, at, &self.decay))
    }
}

/// Computes one metric from whatever snapshots are available. Pure: the same
/// inputs always yield the same output.
pub fn compute(
    spec: &MetricSpec,
    snapshots: &BTreeMap<String, Snapshot>,
    at: DateTime<Utc>,
    decay: &ConfidenceDecay,
) -> DerivedMetric {
    let present: Vec<&Snapshot> = spec
        .sources
        .iter()
        .filter_map(|key| snapshots.get(key))
        .collect();

    if present.is_empty() {
        return baseline_metric(spec, at, decay);
    }

    let breakdown: Vec<ScoreComponent> = spec
        .kind
        .components()
        .iter()
        .map(|&component| {
            let score = present
                .iter()
                .find_map(|s| spec.kind.sub_score(component, &s.payload))
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 100.0));
            ScoreComponent {
                component: component.to_string(),
                weight: spec.weights.get(component).copied().unwrap_or(0.0),
                score: score.unwrap_or(NEUTRAL_SCORE),
                defaulted: score.is_none(),
            }
        })
        .collect();

    let weighted: f64 = breakdown.iter().map(|c| c.weight * c.score).sum();
    let value = if weighted.is_finite() {
        spec.range.from_unit_score(weighted)
    } else {
        spec.range.clamp(spec.baseline)
    };

    let stale = present.len() < spec.sources.len() || present.iter().any(|s| s.is_stale());
    let confidence = present
        .iter()
        .map(|s| s.fetched_at)
        .min()
        .map(|oldest| decay.confidence(at.signed_duration_since(oldest)))
        .unwrap_or(decay.floor);

    DerivedMetric {
        name: spec.name.clone(),
        value,
        computed_at: at,
        stale,
        sources: present.iter().map(|s| s.source_key.clone()).collect(),
        label: classify_value(spec, value),
        confidence,
        breakdown,
    }
}

fn baseline_metric(spec: &MetricSpec, at: DateTime<Utc>, decay: &ConfidenceDecay) -> DerivedMetric {
    let value = spec.range.clamp(spec.baseline);
    DerivedMetric {
        name: spec.name.clone(),
        value,
        computed_at: at,
        stale: true,
        sources: Vec::new(),
        label: classify_value(spec, value),
        confidence: decay.floor,
        breakdown: spec
            .kind
            .components()
            .iter()
            .map(|&component| ScoreComponent {
                component: component.to_string(),
                weight: spec.weights.get(component).copied().unwrap_or(0.0),
                score: NEUTRAL_SCORE,
                defaulted: true,
            })
            .collect(),
    }
}

fn classify_value(spec: &MetricSpec, value: f64) -> Option<String> {
    spec.thresholds
        .as_ref()
        .map(|t| t.classify(value).to_string())
}
