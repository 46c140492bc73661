use serde::{Deserialize, Serialize};

/// Exponential confidence decay for cached data: confidence halves every
/// `half_life_minutes` and never drops below `floor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceDecay {
    pub initial: f64,
    pub half_life_minutes: f64,
    pub floor: f64,
}

impl Default for ConfidenceDecay {
    fn default() -> Self {
        Self {
            initial: 0.95,
            half_life_minutes: 45.0,
            floor: 0.5,
        }
    }
}

impl ConfidenceDecay {
    pub fn confidence(&self, age: chrono::Duration) -> f64 {
        // Future timestamps (clock skew) count as brand new.
        let minutes = (age.num_milliseconds().max(0) as f64) / 60_000.0;
        let rate = std::f64::consts::LN_2 / self.half_life_minutes;
        let value = self.initial * (-rate * minutes).exp();
        if value.is_finite() {
            value.max(self.floor)
        } else {
            self.floor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayAction {
    None,
    Rebaseline,
    Fallback,
    Alert,
}

impl DecayAction {
    pub fn for_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            DecayAction::None
        } else if confidence >= 0.7 {
            DecayAction::Rebaseline
        } else if confidence >= 0.6 {
            DecayAction::Fallback
        } else {
            DecayAction::Alert
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecayAction::None => "none",
            DecayAction::Rebaseline => "rebaseline",
            DecayAction::Fallback => "fallback",
            DecayAction::Alert => "alert",
        }
    }
}
