use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMPONENTS: &[&str] = &["inning", "closeness", "outs"];

pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[("inning", 0.40), ("closeness", 0.45), ("outs", 0.15)];

const REGULATION_INNINGS: f64 = 9.0;
const MAX_OUTS_BEFORE_THIRD: f64 = 2.0;
/// Each run of margin removes this many points of closeness.
const CLOSENESS_PER_RUN: f64 = 20.0;

/// Live game state used for the leverage multiplier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub inning: Option<f64>,
    /// Home score minus away score.
    #[serde(default)]
    pub run_margin: Option<f64>,
    #[serde(default)]
    pub outs: Option<f64>,
}

pub fn sub_score(component: &str, payload: &Value) -> Option<f64> {
    let state = GameState::deserialize(payload).ok()?;
    match component {
        "inning" => {
            let inning = state.inning?;
            (inning >= 1.0).then(|| (inning / REGULATION_INNINGS).min(1.0) * 100.0)
        }
        "closeness" => Some(100.0 - CLOSENESS_PER_RUN * state.run_margin?.abs()),
        "outs" => Some(state.outs?.min(MAX_OUTS_BEFORE_THIRD) / MAX_OUTS_BEFORE_THIRD * 100.0),
        _ => None,
    }
}
