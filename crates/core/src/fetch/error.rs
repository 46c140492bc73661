use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("response is not valid JSON: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout { .. } => "timeout",
            FetchError::Network(_) => "network",
            FetchError::Http(_) => "http",
            FetchError::Parse(_) => "parse",
        }
    }
}

impl FetchError {
    /// Classifies a reqwest failure. The client carries only a connect
    /// timeout, so a reqwest timeout is reported as that bound.
    pub fn from_transport(err: reqwest::Error, connect_timeout: Duration) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout {
                after_ms: u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX),
            };
        }
        if let Some(status) = err.status() {
            return FetchError::Http(status.as_u16());
        }
        if err.is_decode() {
            return FetchError::Parse(err.to_string());
        }
        FetchError::Network(err.to_string())
    }
}
