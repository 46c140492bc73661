pub mod error;
pub mod http;
pub mod synthetic;

use crate::config::Settings;
use crate::domain::source::Source;
use crate::fetch::error::FetchError;
use crate::fetch::http::HttpJsonFetcher;
use crate::fetch::synthetic::SyntheticFetcher;
use serde_json::Value;

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    fn fetcher_name(&self) -> &'static str;

    /// Issues exactly one request for `source`. Timeouts are applied by
    /// [`fetch_bounded`], which callers should use instead of calling this directly.
    async fn fetch(&self, source: &Source) -> Result<Value, FetchError>;
}

impl std::fmt::Debug for dyn SourceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.fetcher_name())
    }
}

/// Runs one fetch under the source's timeout. The request future is dropped
/// (cancelling the request) when the timeout elapses.
pub async fn fetch_bounded(fetcher: &dyn SourceFetcher, source: &Source) -> Result<Value, FetchError> {
    match tokio::time::timeout(source.timeout, fetcher.fetch(source)).await {
        Ok(res) => res,
        Err(_) => Err(FetchError::Timeout {
            after_ms: u64::try_from(source.timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Sends `synthetic://` sources to the synthetic fetcher and everything else
/// over HTTP. With `force_synthetic`, every source is served synthetically.
#[derive(Debug)]
pub struct RoutingFetcher {
    http: HttpJsonFetcher,
    synthetic: SyntheticFetcher,
    force_synthetic: bool,
}

impl RoutingFetcher {
    pub fn new(http: HttpJsonFetcher, synthetic: SyntheticFetcher) -> Self {
        Self {
            http,
            synthetic,
            force_synthetic: false,
        }
    }

    /// The fetcher both binaries run: HTTP with the configured user agent,
    /// synthetic data seeded from settings.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            HttpJsonFetcher::from_settings(settings)?,
            SyntheticFetcher::new(settings.synthetic_seed),
        )
        .force_synthetic(settings.force_synthetic))
    }

    pub fn force_synthetic(mut self, force: bool) -> Self {
        self.force_synthetic = force;
        self
    }
}

#[async_trait::async_trait]
impl SourceFetcher for RoutingFetcher {
    fn fetcher_name(&self) -> &'static str {
        "routing"
    }

    async fn fetch(&self, source: &Source) -> Result<Value, FetchError> {
        if self.force_synthetic || source.is_synthetic_url() {
            self.synthetic.fetch(source).await
        } else {
            self.http.fetch(source).await
        }
    }
}
