use anyhow::Context;
use blaze_core::config::Settings;
use blaze_core::fetch::RoutingFetcher;
use blaze_core::pipeline::Pipeline;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;

#[derive(Debug, Parser)]
#[command(name = "blaze_worker")]
struct Args {
    /// Pipeline config (JSON). Overrides BLAZE_PIPELINE_CONFIG.
    #[arg(long)]
    config: Option<String>,

    /// Serve every source from the synthetic generator instead of the network.
    /// Same as BLAZE_FORCE_SYNTHETIC=1.
    #[arg(long)]
    synthetic: bool,

    /// Refresh every source once, print the metrics as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Seed for synthetic data. Overrides BLAZE_SYNTHETIC_SEED.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(path) = args.config {
        settings.pipeline_config_path = Some(path);
    }
    if let Some(seed) = args.seed {
        settings.synthetic_seed = seed;
    }
    settings.force_synthetic |= args.synthetic;

    if let Err(err) = run(&settings, args.once).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, once: bool) -> anyhow::Result<()> {
    let config = settings.load_pipeline_config()?;
    let fetcher = RoutingFetcher::from_settings(settings)?;

    let pipeline = Pipeline::new(config, Arc::new(fetcher));
    pipeline
        .metrics()
        .subscribe_all(pipeline.config().metric_names(), report::log_metric);

    tracing::info!(
        sources = pipeline.sources().len(),
        synthetic = settings.force_synthetic,
        seed = settings.synthetic_seed,
        once,
        "worker starting"
    );

    if once {
        let outcomes = pipeline.refresh_all().await;
        let failed = report::log_outcomes(&outcomes);
        let metrics = pipeline.current_metrics();
        println!(
            "{}",
            serde_json::to_string_pretty(&metrics).context("failed to encode metrics")?
        );
        if failed > 0 {
            tracing::warn!(failed, "some sources failed; affected metrics are stale");
        }
        return Ok(());
    }

    pipeline.start_all().context("failed to start pollers")?;
    shutdown_signal().await;
    pipeline.stop_all();
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown signal received");
}
