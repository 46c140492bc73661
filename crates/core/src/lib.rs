pub mod broadcast;
pub mod cache;
pub mod calc;
pub mod domain;
pub mod fetch;
pub mod pipeline;
pub mod poller;

pub mod config {
    use crate::domain::contract::PipelineConfig;
    use anyhow::Context;

    const DEFAULT_USER_AGENT: &str = concat!("blaze-live-metrics/", env!("CARGO_PKG_VERSION"));

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub pipeline_config_path: Option<String>,
        pub synthetic_seed: u64,
        /// Serve every source from the synthetic fetcher, whatever its URL.
        pub force_synthetic: bool,
        pub http_user_agent: String,
        pub sentry_dsn: Option<String>,
        pub port: Option<u16>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                pipeline_config_path: None,
                synthetic_seed: 0,
                force_synthetic: false,
                http_user_agent: DEFAULT_USER_AGENT.to_string(),
                sentry_dsn: None,
                port: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();
            Ok(Self {
                pipeline_config_path: std::env::var("BLAZE_PIPELINE_CONFIG")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                synthetic_seed: std::env::var("BLAZE_SYNTHETIC_SEED")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(defaults.synthetic_seed),
                force_synthetic: std::env::var("BLAZE_FORCE_SYNTHETIC")
                    .ok()
                    .map(|s| parse_flag(&s))
                    .unwrap_or(defaults.force_synthetic),
                http_user_agent: std::env::var("BLAZE_HTTP_USER_AGENT")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(defaults.http_user_agent),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                port: std::env::var("PORT").ok().and_then(|s| s.parse::<u16>().ok()),
            })
        }

        /// Loads the pipeline config from `BLAZE_PIPELINE_CONFIG`, or the embedded default.
        pub fn load_pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
            match self.pipeline_config_path.as_deref() {
                Some(path) => {
                    let text = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read pipeline config {path}"))?;
                    PipelineConfig::from_json_str(&text)
                        .with_context(|| format!("invalid pipeline config {path}"))
                }
                None => PipelineConfig::embedded_default().context("invalid embedded pipeline config"),
            }
        }
    }

    fn parse_flag(s: &str) -> bool {
        matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

}
