//! Property tests for the metric calculator.
//!
//! 1. Bounded output: any payload yields a finite value inside the metric range
//! 2. Purity: computing twice from the same inputs gives the same metric
//! 3. Staleness: a stale input snapshot always yields a stale metric
//! 4. Decay: confidence stays within [floor, initial] and never grows with age

use blaze_core::calc::compute;
use blaze_core::calc::decay::ConfidenceDecay;
use blaze_core::domain::metric::{MetricKind, MetricSpec, NEUTRAL_SCORE};
use blaze_core::domain::snapshot::Snapshot;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_kind() -> impl Strategy<Value = MetricKind> {
    prop_oneof![
        Just(MetricKind::Readiness),
        Just(MetricKind::Prospect),
        Just(MetricKind::Leverage),
    ]
}

/// Field values as they might arrive from a feed: numbers of any size,
/// nulls, strings, or nothing at all.
fn arb_field() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        3 => (-1.0e6..1.0e6_f64).prop_map(|v| Some(Value::from(v))),
        2 => (-20i64..200).prop_map(|v| Some(Value::from(v))),
        1 => any::<f64>().prop_map(|v| Some(Value::from(v))),
        1 => Just(Some(Value::Null)),
        1 => "[a-z]{0,6}".prop_map(|s| Some(Value::String(s))),
        2 => Just(None),
    ]
}

const FIELDS: &[&str] = &[
    "wins",
    "losses",
    "runs_scored",
    "runs_allowed",
    "division_rank",
    "last10_wins",
    "opponents_win_pct",
    "engagement",
    "intent",
    "fit",
    "timing",
    "inning",
    "run_margin",
    "outs",
];

fn arb_payload() -> impl Strategy<Value = Value> {
    prop::collection::vec(arb_field(), FIELDS.len()).prop_map(|values| {
        let mut map = Map::new();
        for (name, value) in FIELDS.iter().zip(values) {
            if let Some(value) = value {
                map.insert((*name).to_string(), value);
            }
        }
        Value::Object(map)
    })
}

fn spec_for(kind: MetricKind) -> MetricSpec {
    MetricSpec {
        name: format!("{kind}_metric"),
        kind,
        sources: vec!["feed".to_string()],
        weights: kind.default_weights(),
        range: kind.default_range(),
        thresholds: kind.default_thresholds(),
        baseline: kind.default_range().from_unit_score(NEUTRAL_SCORE),
    }
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 19, 0, 0).unwrap()
}

fn inputs(payload: Value, age_minutes: i64) -> BTreeMap<String, Snapshot> {
    let snapshot = Snapshot::new("feed", payload, at() - Duration::minutes(age_minutes));
    BTreeMap::from([("feed".to_string(), snapshot)])
}

// ── 1. Bounded output ────────────────────────────────────────────────

proptest! {
    #[test]
    fn value_is_finite_and_in_range(
        kind in arb_kind(),
        payload in arb_payload(),
        age in 0i64..600,
    ) {
        let spec = spec_for(kind);
        let metric = compute(&spec, &inputs(payload, age), at(), &ConfidenceDecay::default());

        prop_assert!(metric.value.is_finite());
        prop_assert!(metric.value >= spec.range.min && metric.value <= spec.range.max,
            "{} outside {:?}", metric.value, spec.range);
        for component in &metric.breakdown {
            prop_assert!((0.0..=100.0).contains(&component.score));
        }
        if metric.label.is_some() {
            prop_assert!(spec.thresholds.is_some());
        }
    }
}

// ── 2. Purity ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn compute_is_idempotent(kind in arb_kind(), payload in arb_payload(), age in 0i64..600) {
        let spec = spec_for(kind);
        let snapshots = inputs(payload, age);
        let decay = ConfidenceDecay::default();

        let first = compute(&spec, &snapshots, at(), &decay);
        let second = compute(&spec, &snapshots, at(), &decay);
        prop_assert_eq!(first, second);
    }
}

// ── 3. Staleness ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stale_input_means_stale_metric(kind in arb_kind(), payload in arb_payload()) {
        let spec = spec_for(kind);
        let fresh = inputs(payload, 0);
        let stale: BTreeMap<String, Snapshot> = fresh
            .iter()
            .map(|(k, s)| {
                let mut s = s.clone();
                s.freshness = blaze_core::domain::snapshot::Freshness::Stale;
                (k.clone(), s)
            })
            .collect();

        let decay = ConfidenceDecay::default();
        prop_assert!(!compute(&spec, &fresh, at(), &decay).stale);
        prop_assert!(compute(&spec, &stale, at(), &decay).stale);
    }
}

// ── 4. Decay ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn confidence_is_bounded_and_monotone(a in -10_000i64..1_000_000, b in -10_000i64..1_000_000) {
        let decay = ConfidenceDecay::default();
        let (young, old) = if a <= b { (a, b) } else { (b, a) };
        let c_young = decay.confidence(Duration::seconds(young));
        let c_old = decay.confidence(Duration::seconds(old));

        prop_assert!(c_young >= decay.floor && c_young <= decay.initial);
        prop_assert!(c_old >= decay.floor && c_old <= decay.initial);
        prop_assert!(c_old <= c_young);
    }
}

#[test]
fn default_weights_sum_to_one() {
    for kind in [MetricKind::Readiness, MetricKind::Prospect, MetricKind::Leverage] {
        let sum: f64 = kind.default_weights().values().sum();
        assert!((sum - 1.0).abs() < 1e-9, "{kind} weights sum to {sum}");
        assert_eq!(kind.default_weights().len(), kind.components().len());
    }
}
