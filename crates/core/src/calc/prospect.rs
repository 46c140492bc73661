use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMPONENTS: &[&str] = &["engagement", "intent", "fit", "timing"];

pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    ("engagement", 0.25),
    ("intent", 0.30),
    ("fit", 0.20),
    ("timing", 0.25),
];

/// Prospect signals, each already normalized to 0..=100 by the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProspectSignals {
    #[serde(default)]
    pub engagement: Option<f64>,
    #[serde(default)]
    pub intent: Option<f64>,
    #[serde(default)]
    pub fit: Option<f64>,
    #[serde(default)]
    pub timing: Option<f64>,
}

pub fn sub_score(component: &str, payload: &Value) -> Option<f64> {
    let signals = ProspectSignals::deserialize(payload).ok()?;
    match component {
        "engagement" => signals.engagement,
        "intent" => signals.intent,
        "fit" => signals.fit,
        "timing" => signals.timing,
        _ => None,
    }
}
