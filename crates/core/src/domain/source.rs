use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const SYNTHETIC_SCHEME: &str = "synthetic://";
const KEY_PLACEHOLDER: &str = "{key}";

/// One external data feed polled by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub key: String,
    /// Endpoint template; `{key}` is replaced with the source key.
    pub url: String,
    pub timeout: Duration,
    pub interval: Duration,
    /// Snapshots older than this are reported stale.
    pub max_age: Duration,
    /// Payload shape used when the source is served by the synthetic fetcher.
    pub synthetic: Option<SyntheticProfile>,
}

impl Source {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let synthetic = synthetic_profile_from_url(&url);
        Self {
            key: key.into(),
            url,
            timeout: Duration::from_secs(10),
            interval: Duration::from_secs(60),
            max_age: Duration::from_secs(300),
            synthetic,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_synthetic(mut self, profile: SyntheticProfile) -> Self {
        self.synthetic = Some(profile);
        self
    }

    pub fn resolved_url(&self) -> String {
        self.url.replace(KEY_PLACEHOLDER, &self.key)
    }

    pub fn is_synthetic_url(&self) -> bool {
        self.url.starts_with(SYNTHETIC_SCHEME)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyntheticProfile {
    TeamRecord,
    Prospect,
    GameState,
}

impl SyntheticProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntheticProfile::TeamRecord => "team-record",
            SyntheticProfile::Prospect => "prospect",
            SyntheticProfile::GameState => "game-state",
        }
    }
}

impl fmt::Display for SyntheticProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyntheticProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_end_matches('/') {
            "team-record" => Ok(SyntheticProfile::TeamRecord),
            "prospect" => Ok(SyntheticProfile::Prospect),
            "game-state" => Ok(SyntheticProfile::GameState),
            other => Err(format!("unknown synthetic profile '{other}'")),
        }
    }
}

fn synthetic_profile_from_url(url: &str) -> Option<SyntheticProfile> {
    url.strip_prefix(SYNTHETIC_SCHEME)?.parse().ok()
}
