use crate::config::Settings;
use crate::domain::source::Source;
use crate::fetch::error::FetchError;
use crate::fetch::SourceFetcher;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Error bodies are truncated to this many bytes in parse errors.
const MAX_ERROR_BODY: usize = 200;

/// Plain GET-and-parse-JSON fetcher. The per-source timeout is enforced by
/// [`crate::fetch::fetch_bounded`], not by the client.
#[derive(Debug, Clone)]
pub struct HttpJsonFetcher {
    http: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpJsonFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let connect_timeout_secs = std::env::var("BLAZE_HTTP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        Self::with_connect_timeout(user_agent, Duration::from_secs(connect_timeout_secs))
    }

    pub fn with_connect_timeout(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .context("failed to build source http client")?;

        Ok(Self {
            http,
            connect_timeout,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.http_user_agent)
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        FetchError::from_transport(err, self.connect_timeout)
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpJsonFetcher {
    fn fetcher_name(&self) -> &'static str {
        "http_json"
    }

    async fn fetch(&self, source: &Source) -> Result<Value, FetchError> {
        let url = source.resolved_url();

        let res = self
            .http
            .get(&url)
            .headers(Self::headers())
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Http(status.as_u16()));
        }

        let text = res.text().await.map_err(|err| self.transport_error(err))?;
        serde_json::from_str::<Value>(&text).map_err(|err| {
            let mut body = text;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            FetchError::Parse(format!("{err}: {body}"))
        })
    }
}
