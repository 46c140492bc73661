use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub label: String,
    /// Inclusive lower bound.
    pub min: f64,
}

impl Tier {
    pub fn new(label: impl Into<String>, min: f64) -> Self {
        Self {
            label: label.into(),
            min,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("floor label must be non-empty")]
    EmptyFloorLabel,

    #[error("threshold labels must be non-empty")]
    EmptyLabel,

    #[error("threshold '{label}' must be finite (got {min})")]
    NonFinite { label: String, min: f64 },

    #[error("thresholds '{first}' and '{second}' share the bound {bound}")]
    DuplicateBound {
        first: String,
        second: String,
        bound: f64,
    },
}

/// Ordered label thresholds. Tiers are kept sorted by descending `min`, so the
/// first tier whose bound is met is the highest one that applies.
///
/// Only `new` builds one; config documents carry raw `Tier`s.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    tiers: Vec<Tier>,
    floor_label: String,
}

impl Thresholds {
    pub fn new(mut tiers: Vec<Tier>, floor_label: impl Into<String>) -> Result<Self, ThresholdError> {
        let floor_label = floor_label.into().trim().to_string();
        if floor_label.is_empty() {
            return Err(ThresholdError::EmptyFloorLabel);
        }
        for tier in &mut tiers {
            tier.label = tier.label.trim().to_string();
            if tier.label.is_empty() {
                return Err(ThresholdError::EmptyLabel);
            }
            if !tier.min.is_finite() {
                return Err(ThresholdError::NonFinite {
                    label: tier.label.clone(),
                    min: tier.min,
                });
            }
        }

        tiers.sort_by(|a, b| b.min.total_cmp(&a.min));
        if let Some(pair) = tiers.windows(2).find(|w| w[0].min == w[1].min) {
            return Err(ThresholdError::DuplicateBound {
                first: pair[0].label.clone(),
                second: pair[1].label.clone(),
                bound: pair[0].min,
            });
        }

        Ok(Self { tiers, floor_label })
    }

    pub fn classify(&self, value: f64) -> &str {
        self.tiers
            .iter()
            .find(|tier| value >= tier.min)
            .map(|tier| tier.label.as_str())
            .unwrap_or(&self.floor_label)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn floor_label(&self) -> &str {
        &self.floor_label
    }
}

/// Prospect tiers: HOT 85, WARM 65, QUALIFIED 45, NURTURE 25, else COLD.
pub fn prospect_thresholds() -> Thresholds {
    Thresholds {
        tiers: vec![
            Tier::new("HOT", 85.0),
            Tier::new("WARM", 65.0),
            Tier::new("QUALIFIED", 45.0),
            Tier::new("NURTURE", 25.0),
        ],
        floor_label: "COLD".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_bound_is_inclusive() {
        let t = prospect_thresholds();
        assert_eq!(t.classify(65.0), "WARM");
        assert_eq!(t.classify(64.99), "QUALIFIED");
        assert_eq!(t.classify(85.0), "HOT");
        assert_eq!(t.classify(100.0), "HOT");
        assert_eq!(t.classify(25.0), "NURTURE");
        assert_eq!(t.classify(24.999), "COLD");
        assert_eq!(t.classify(0.0), "COLD");
    }

    #[test]
    fn nan_falls_to_floor() {
        assert_eq!(prospect_thresholds().classify(f64::NAN), "COLD");
    }

    #[test]
    fn sorts_unordered_tiers() {
        let t = Thresholds::new(
            vec![Tier::new("LOW", 10.0), Tier::new("HIGH", 90.0), Tier::new("MID", 50.0)],
            "NONE",
        )
        .unwrap();
        let labels: Vec<_> = t.tiers().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["HIGH", "MID", "LOW"]);
        assert_eq!(t.classify(50.0), "MID");
        assert_eq!(t.classify(9.0), "NONE");
    }

    #[test]
    fn rejects_duplicate_bounds_and_blank_labels() {
        assert_eq!(
            Thresholds::new(vec![Tier::new("A", 10.0), Tier::new("B", 10.0)], "C"),
            Err(ThresholdError::DuplicateBound {
                first: "A".to_string(),
                second: "B".to_string(),
                bound: 10.0,
            })
        );
        assert_eq!(
            Thresholds::new(vec![Tier::new(" ", 10.0)], "C"),
            Err(ThresholdError::EmptyLabel)
        );
        assert_eq!(
            Thresholds::new(vec![Tier::new("A", 10.0)], ""),
            Err(ThresholdError::EmptyFloorLabel)
        );
    }

    #[test]
    fn rejects_non_finite_bounds() {
        let err = Thresholds::new(vec![Tier::new("A", f64::INFINITY)], "C").unwrap_err();
        assert!(matches!(err, ThresholdError::NonFinite { ref label, .. } if label == "A"), "{err}");
    }
}
