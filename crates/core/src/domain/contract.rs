use crate::calc::classify::{ThresholdError, Thresholds, Tier};
use crate::domain::metric::{MetricKind, MetricRange, MetricSpec};
use crate::domain::source::{Source, SyntheticProfile, SYNTHETIC_SCHEME};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use thiserror::Error;

const EMBEDDED_PIPELINE_JSON: &str = include_str!("../../config/pipeline.json");
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pipeline config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source key must be non-empty")]
    EmptySourceKey,

    #[error("duplicate source key '{0}'")]
    DuplicateSource(String),

    #[error("source '{key}': {field} must be > 0")]
    NonPositiveDuration { key: String, field: &'static str },

    #[error("source '{key}': url must be non-empty")]
    EmptyUrl { key: String },

    #[error("source '{key}': {detail}")]
    InvalidSynthetic { key: String, detail: String },

    #[error("metric name must be non-empty")]
    EmptyMetricName,

    #[error("duplicate metric name '{0}'")]
    DuplicateMetric(String),

    #[error("metric '{metric}' reads unknown source '{source_key}'")]
    UnknownSource { metric: String, source_key: String },

    #[error("metric '{metric}' must read at least one source")]
    NoSources { metric: String },

    #[error("metric '{metric}': weights must cover exactly {expected:?} (got {actual:?})")]
    WeightComponents {
        metric: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("metric '{metric}': weight for '{component}' must be finite and >= 0 (got {weight})")]
    InvalidWeight {
        metric: String,
        component: String,
        weight: f64,
    },

    #[error("metric '{metric}': weights must sum to 1.0 (got {sum})")]
    WeightSum { metric: String, sum: f64 },

    #[error("metric '{metric}': range must satisfy min < max (got {min}..{max})")]
    InvalidRange { metric: String, min: f64, max: f64 },

    #[error("metric '{metric}': {source}")]
    InvalidThresholds {
        metric: String,
        #[source]
        source: ThresholdError,
    },

    #[error("metric '{metric}': baseline {baseline} outside range {min}..{max}")]
    BaselineOutOfRange {
        metric: String,
        baseline: f64,
        min: f64,
        max: f64,
    },
}

/// On-disk shape of the pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfigDoc {
    pub sources: Vec<SourceDoc>,
    #[serde(default)]
    pub metrics: Vec<MetricDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDoc {
    pub key: String,
    pub url: String,
    pub timeout_ms: u64,
    pub interval_ms: u64,
    /// Defaults to three polling intervals.
    pub max_age_ms: Option<u64>,
    #[serde(default)]
    pub synthetic_profile: Option<SyntheticProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDoc {
    pub name: String,
    pub kind: MetricKind,
    pub sources: Vec<String>,
    #[serde(default)]
    pub weights: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub range: Option<MetricRange>,
    #[serde(default)]
    pub thresholds: Option<Vec<Tier>>,
    #[serde(default)]
    pub floor_label: Option<String>,
    #[serde(default)]
    pub baseline: Option<f64>,
}

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sources: Vec<Source>,
    pub metrics: Vec<MetricSpec>,
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let doc = serde_json::from_str::<PipelineConfigDoc>(text)?;
        doc.validate_and_into_config()
    }

    pub fn embedded_default() -> Result<Self, ConfigError> {
        Self::from_json_str(EMBEDDED_PIPELINE_JSON)
    }

    pub fn source(&self, key: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.key == key)
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }
}

impl PipelineConfigDoc {
    pub fn validate_and_into_config(self) -> Result<PipelineConfig, ConfigError> {
        let mut seen_sources = BTreeSet::<String>::new();
        let mut sources = Vec::with_capacity(self.sources.len());
        for doc in self.sources {
            let source = doc.validate_and_into_source()?;
            if !seen_sources.insert(source.key.clone()) {
                return Err(ConfigError::DuplicateSource(source.key));
            }
            sources.push(source);
        }

        let mut seen_metrics = BTreeSet::<String>::new();
        let mut metrics = Vec::with_capacity(self.metrics.len());
        for doc in self.metrics {
            let spec = doc.validate_and_into_spec(&seen_sources)?;
            if !seen_metrics.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicateMetric(spec.name));
            }
            metrics.push(spec);
        }

        Ok(PipelineConfig { sources, metrics })
    }
}

impl SourceDoc {
    fn validate_and_into_source(self) -> Result<Source, ConfigError> {
        let key = self.key.trim().to_string();
        if key.is_empty() {
            return Err(ConfigError::EmptySourceKey);
        }

        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(ConfigError::EmptyUrl { key });
        }

        for (field, value) in [("timeout_ms", self.timeout_ms), ("interval_ms", self.interval_ms)] {
            if value == 0 {
                return Err(ConfigError::NonPositiveDuration { key, field });
            }
        }
        let max_age_ms = self.max_age_ms.unwrap_or(self.interval_ms.saturating_mul(3));
        if max_age_ms == 0 {
            return Err(ConfigError::NonPositiveDuration {
                key,
                field: "max_age_ms",
            });
        }

        let mut source = Source::new(key, url)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_interval(Duration::from_millis(self.interval_ms))
            .with_max_age(Duration::from_millis(max_age_ms));

        if let Some(rest) = source.url.strip_prefix(SYNTHETIC_SCHEME) {
            let from_url = rest
                .parse::<SyntheticProfile>()
                .map_err(|detail| ConfigError::InvalidSynthetic {
                    key: source.key.clone(),
                    detail,
                })?;
            if let Some(declared) = self.synthetic_profile {
                if declared != from_url {
                    return Err(ConfigError::InvalidSynthetic {
                        key: source.key,
                        detail: format!("synthetic_profile {declared} conflicts with url profile {from_url}"),
                    });
                }
            }
        } else if let Some(profile) = self.synthetic_profile {
            source = source.with_synthetic(profile);
        }

        Ok(source)
    }
}

impl MetricDoc {
    fn validate_and_into_spec(self, known_sources: &BTreeSet<String>) -> Result<MetricSpec, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyMetricName);
        }

        if self.sources.is_empty() {
            return Err(ConfigError::NoSources { metric: name });
        }
        let mut sources = Vec::with_capacity(self.sources.len());
        for key in self.sources {
            let key = key.trim().to_string();
            if !known_sources.contains(&key) {
                return Err(ConfigError::UnknownSource {
                    metric: name,
                    source_key: key,
                });
            }
            if !sources.contains(&key) {
                sources.push(key);
            }
        }

        let weights = self.weights.unwrap_or_else(|| self.kind.default_weights());
        validate_weights(&name, self.kind, &weights)?;

        let range = self.range.unwrap_or_else(|| self.kind.default_range());
        if !(range.min.is_finite() && range.max.is_finite() && range.min < range.max) {
            return Err(ConfigError::InvalidRange {
                metric: name,
                min: range.min,
                max: range.max,
            });
        }

        let thresholds = match self.thresholds {
            Some(tiers) => {
                let floor = self.floor_label.unwrap_or_else(|| "BELOW".to_string());
                Some(
                    Thresholds::new(tiers, floor)
                        .map_err(|source| ConfigError::InvalidThresholds {
                            metric: name.clone(),
                            source,
                        })?,
                )
            }
            None => self.kind.default_thresholds(),
        };

        let baseline = self
            .baseline
            .unwrap_or_else(|| range.from_unit_score(crate::domain::metric::NEUTRAL_SCORE));
        if !baseline.is_finite() || baseline < range.min || baseline > range.max {
            return Err(ConfigError::BaselineOutOfRange {
                metric: name,
                baseline,
                min: range.min,
                max: range.max,
            });
        }

        Ok(MetricSpec {
            name,
            kind: self.kind,
            sources,
            weights,
            range,
            thresholds,
            baseline,
        })
    }
}

fn validate_weights(
    metric: &str,
    kind: MetricKind,
    weights: &BTreeMap<String, f64>,
) -> Result<(), ConfigError> {
    let expected: BTreeSet<&str> = kind.components().iter().copied().collect();
    let actual: BTreeSet<&str> = weights.keys().map(String::as_str).collect();
    if expected != actual {
        return Err(ConfigError::WeightComponents {
            metric: metric.to_string(),
            expected: expected.into_iter().map(str::to_string).collect(),
            actual: actual.into_iter().map(str::to_string).collect(),
        });
    }

    for (component, &weight) in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::InvalidWeight {
                metric: metric.to_string(),
                component: component.clone(),
                weight,
            });
        }
    }

    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::WeightSum {
            metric: metric.to_string(),
            sum,
        });
    }

    Ok(())
}
