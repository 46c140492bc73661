use crate::calc::leverage::GameState;
use crate::calc::prospect::ProspectSignals;
use crate::calc::readiness::TeamRecord;
use crate::domain::source::{Source, SyntheticProfile};
use crate::fetch::error::FetchError;
use crate::fetch::SourceFetcher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Deterministic stand-in for live feeds. Output depends only on the seed,
/// the source key and how many times that key has been fetched.
#[derive(Debug, Default)]
pub struct SyntheticFetcher {
    seed: u64,
    calls: Mutex<HashMap<String, u64>>,
}

impl SyntheticFetcher {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn next_call(&self, key: &str) -> u64 {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let n = calls.entry(key.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    fn rng_for(&self, key: &str, call: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ fnv1a(key) ^ call.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

#[async_trait::async_trait]
impl SourceFetcher for SyntheticFetcher {
    fn fetcher_name(&self) -> &'static str {
        "synthetic"
    }

    async fn fetch(&self, source: &Source) -> Result<Value, FetchError> {
        let profile = source.synthetic.ok_or_else(|| {
            FetchError::Network(format!("source '{}' has no synthetic profile", source.key))
        })?;

        let call = self.next_call(&source.key);
        let mut rng = self.rng_for(&source.key, call);
        let payload = match profile {
            SyntheticProfile::TeamRecord => serde_json::to_value(team_record(&mut rng)),
            SyntheticProfile::Prospect => serde_json::to_value(prospect(&mut rng)),
            SyntheticProfile::GameState => serde_json::to_value(game_state(&mut rng)),
        };
        payload.map_err(|err| FetchError::Parse(err.to_string()))
    }
}

fn team_record(rng: &mut StdRng) -> TeamRecord {
    let games: u32 = rng.gen_range(20..=162);
    let wins = rng.gen_range(games * 35 / 100..=games * 65 / 100);
    let runs_scored = f64::from(games) * rng.gen_range(3.8..5.4);
    let runs_allowed = f64::from(games) * rng.gen_range(3.8..5.4);
    TeamRecord {
        wins: Some(f64::from(wins)),
        losses: Some(f64::from(games - wins)),
        runs_scored: Some(runs_scored.round()),
        runs_allowed: Some(runs_allowed.round()),
        division_rank: Some(f64::from(rng.gen_range(1..=5u32))),
        last10_wins: Some(f64::from(rng.gen_range(0..=10u32))),
        opponents_win_pct: Some((rng.gen_range(0.460..0.540_f64) * 1000.0).round() / 1000.0),
    }
}

fn prospect(rng: &mut StdRng) -> ProspectSignals {
    let mut signal = || Some((rng.gen_range(0.0..100.0_f64) * 10.0).round() / 10.0);
    ProspectSignals {
        engagement: signal(),
        intent: signal(),
        fit: signal(),
        timing: signal(),
    }
}

fn game_state(rng: &mut StdRng) -> GameState {
    GameState {
        inning: Some(f64::from(rng.gen_range(1..=9u32))),
        run_margin: Some(f64::from(rng.gen_range(-6..=6i32))),
        outs: Some(f64::from(rng.gen_range(0..=2u32))),
    }
}

// FNV-1a keeps seeds stable across builds, unlike `DefaultHasher`.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
