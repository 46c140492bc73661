use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COMPONENTS: &[&str] = &["record", "run_diff", "position", "momentum", "sos"];

pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    ("record", 0.30),
    ("run_diff", 0.25),
    ("position", 0.20),
    ("momentum", 0.15),
    ("sos", 0.10),
];

const DIVISION_SIZE: f64 = 5.0;

/// Team record payload. Every field is optional; missing fields fall back to
/// the neutral sub-score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    #[serde(default)]
    pub wins: Option<f64>,
    #[serde(default)]
    pub losses: Option<f64>,
    #[serde(default)]
    pub runs_scored: Option<f64>,
    #[serde(default)]
    pub runs_allowed: Option<f64>,
    #[serde(default)]
    pub division_rank: Option<f64>,
    #[serde(default)]
    pub last10_wins: Option<f64>,
    /// Opponents' combined winning percentage, 0..=1.
    #[serde(default)]
    pub opponents_win_pct: Option<f64>,
}

impl TeamRecord {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Self::deserialize(payload).ok()
    }

    fn games(&self) -> Option<f64> {
        let games = self.wins? + self.losses?;
        (games > 0.0).then_some(games)
    }
}

pub fn sub_score(component: &str, payload: &Value) -> Option<f64> {
    let record = TeamRecord::from_payload(payload)?;
    match component {
        "record" => Some(record.wins? / record.games()? * 100.0),
        "run_diff" => {
            let per_game = (record.runs_scored? - record.runs_allowed?) / record.games()?;
            Some(50.0 + 25.0 * per_game)
        }
        "position" => {
            let rank = record.division_rank?;
            (rank >= 1.0).then(|| (DIVISION_SIZE - rank) / (DIVISION_SIZE - 1.0) * 100.0)
        }
        "momentum" => Some(record.last10_wins? * 10.0),
        "sos" => Some(record.opponents_win_pct? * 100.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_is_win_pct_times_100() {
        let payload = json!({"wins": 81, "losses": 81});
        assert_eq!(sub_score("record", &payload), Some(50.0));
        assert_eq!(sub_score("run_diff", &payload), None);
    }

    #[test]
    fn run_diff_scales_per_game() {
        let payload = json!({"wins": 6, "losses": 4, "runs_scored": 55, "runs_allowed": 35});
        // +2 runs per game.
        assert_eq!(sub_score("run_diff", &payload), Some(100.0));
    }

    #[test]
    fn position_and_momentum() {
        let payload = json!({"division_rank": 1, "last10_wins": 7, "opponents_win_pct": 0.52});
        assert_eq!(sub_score("position", &payload), Some(100.0));
        assert_eq!(sub_score("momentum", &payload), Some(70.0));
        let sos = sub_score("sos", &payload).unwrap();
        assert!((sos - 52.0).abs() < 1e-9);

        let last = json!({"division_rank": 5});
        assert_eq!(sub_score("position", &last), Some(0.0));
    }

    #[test]
    fn zero_games_and_bad_types_are_missing() {
        assert_eq!(sub_score("record", &json!({"wins": 0, "losses": 0})), None);
        assert_eq!(sub_score("record", &json!({"wins": "81", "losses": 81})), None);
        assert_eq!(sub_score("record", &json!("81-81")), None);
        assert_eq!(sub_score("position", &json!({"division_rank": 0})), None);
    }
}
