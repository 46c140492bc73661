use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blaze_core::config::Settings;
use blaze_core::domain::contract::PipelineConfig;
use blaze_core::domain::metric::DerivedMetric;
use blaze_core::domain::snapshot::{Freshness, Snapshot};
use blaze_core::fetch::RoutingFetcher;
use blaze_core::pipeline::Pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let config = settings.load_pipeline_config().map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %format!("{e:#}"), "pipeline config rejected");
        e
    })?;
    let pipeline = build_pipeline(&settings, config)?;
    tracing::info!(
        sources = pipeline.sources().len(),
        force_synthetic = settings.force_synthetic,
        "pipeline ready"
    );

    let state = AppState::new(Arc::clone(&pipeline));
    pipeline.start_all()?;

    let app = router(state);

    let port: u16 = settings.port.unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.stop_all();
    Ok(())
}

fn build_pipeline(settings: &Settings, config: PipelineConfig) -> anyhow::Result<Arc<Pipeline>> {
    let fetcher = RoutingFetcher::from_settings(settings)?;
    Ok(Arc::new(Pipeline::new(config, Arc::new(fetcher))))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/sources", get(list_sources))
        .route("/snapshots/:key", get(get_snapshot))
        .route("/metrics", get(list_metrics))
        .route("/metrics/:name", get(get_metric))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    latest: Arc<RwLock<BTreeMap<String, DerivedMetric>>>,
}

impl AppState {
    /// Subscribes to every configured metric; call before the pollers start.
    fn new(pipeline: Arc<Pipeline>) -> Self {
        let latest: Arc<RwLock<BTreeMap<String, DerivedMetric>>> = Arc::default();
        let sink = Arc::clone(&latest);
        pipeline
            .metrics()
            .subscribe_all(pipeline.config().metric_names(), move |metric: &DerivedMetric| {
                sink.write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(metric.name.clone(), metric.clone());
                Ok(())
            });
        Self { pipeline, latest }
    }

    /// Last broadcast value, or a fresh computation from the cache if none yet.
    fn metric(&self, name: &str) -> Option<DerivedMetric> {
        let cached = self
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        cached.or_else(|| self.pipeline.current_metric(name))
    }
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    checked_at: DateTime<Utc>,
    sources_total: usize,
    sources_fresh: usize,
    metrics_stale: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let sources = state.pipeline.sources();
    let sources_fresh = sources
        .iter()
        .filter_map(|s| state.pipeline.snapshot(&s.key))
        .filter(|s| !s.is_stale())
        .count();
    let metrics_stale: Vec<String> = state
        .pipeline
        .config()
        .metric_names()
        .into_iter()
        .filter(|name| state.metric(name).map_or(true, |m| m.stale))
        .collect();

    let status = if sources_fresh == sources.len() && metrics_stale.is_empty() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthReport {
        status,
        checked_at: Utc::now(),
        sources_total: sources.len(),
        sources_fresh,
        metrics_stale,
    })
}

#[derive(Debug, Serialize)]
struct ApiSource {
    key: String,
    url: String,
    interval_ms: u64,
    timeout_ms: u64,
    max_age_ms: u64,
    polling: bool,
    freshness: Option<Freshness>,
    fetched_at: Option<DateTime<Utc>>,
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<ApiSource>> {
    let poller = state.pipeline.poller();
    let sources = state
        .pipeline
        .sources()
        .iter()
        .map(|source| {
            let snapshot = state.pipeline.snapshot(&source.key);
            ApiSource {
                key: source.key.clone(),
                url: source.url.clone(),
                interval_ms: millis(source.interval),
                timeout_ms: millis(source.timeout),
                max_age_ms: millis(source.max_age),
                polling: poller.is_running(&source.key),
                freshness: snapshot.as_ref().map(|s| s.freshness),
                fetched_at: snapshot.as_ref().map(|s| s.fetched_at),
            }
        })
        .collect();
    Json(sources)
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Snapshot>, StatusCode> {
    if state.pipeline.config().source(&key).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    // Known source that has never produced data yet.
    let snapshot = state
        .pipeline
        .snapshot(&key)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(snapshot))
}

async fn list_metrics(State(state): State<AppState>) -> Json<Vec<DerivedMetric>> {
    let metrics = state
        .pipeline
        .config()
        .metric_names()
        .iter()
        .filter_map(|name| state.metric(name))
        .collect();
    Json(metrics)
}

async fn get_metric(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DerivedMetric>, StatusCode> {
    state.metric(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received; stopping pollers");
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

#[cfg(test)]
mod tests {
    use super::*;
    use blaze_core::fetch::synthetic::SyntheticFetcher;

    fn state() -> AppState {
        let config = PipelineConfig::embedded_default().unwrap();
        let pipeline = Pipeline::new(config, Arc::new(SyntheticFetcher::new(42)));
        AppState::new(Arc::new(pipeline))
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let state = state();
        let err = get_metric(State(state.clone()), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);

        let err = get_snapshot(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn before_first_fetch_metrics_are_stale_baselines() {
        let state = state();
        let err = get_snapshot(State(state.clone()), Path("cardinals".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, StatusCode::SERVICE_UNAVAILABLE);

        let Json(metric) = get_metric(State(state.clone()), Path("cardinals_readiness".to_string()))
            .await
            .unwrap();
        assert!(metric.stale);

        let Json(report) = health(State(state)).await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.sources_fresh, 0);
        assert_eq!(report.metrics_stale.len(), 3);
    }

    #[tokio::test]
    async fn broadcast_metrics_are_served_after_refresh() {
        let state = state();
        state.pipeline.refresh_all().await;

        assert_eq!(state.latest.read().unwrap().len(), 3);
        let Json(metrics) = list_metrics(State(state.clone())).await;
        assert_eq!(metrics.len(), 3);
        assert!(metrics.iter().all(|m| !m.stale));

        let Json(snapshot) = get_snapshot(State(state.clone()), Path("prospects".to_string()))
            .await
            .unwrap();
        assert_eq!(snapshot.source_key, "prospects");

        let Json(sources) = list_sources(State(state.clone())).await;
        assert!(sources.iter().all(|s| s.freshness == Some(Freshness::Fresh)));
        assert!(sources.iter().all(|s| !s.polling));

        let Json(report) = health(State(state)).await;
        assert_eq!(report.status, "ok");
    }

    #[tokio::test]
    async fn default_settings_serve_readable_metrics() {
        let settings = Settings::default();
        let pipeline = build_pipeline(&settings, settings.load_pipeline_config().unwrap()).unwrap();
        let state = AppState::new(pipeline);

        let outcomes = state.pipeline.refresh_all().await;
        assert_eq!(outcomes.len(), 3);
        for (key, outcome) in &outcomes {
            assert!(
                matches!(outcome, blaze_core::poller::TickOutcome::Fresh { .. }),
                "{key}: {outcome:?}"
            );
        }

        let Json(report) = health(State(state.clone())).await;
        assert_eq!(report.status, "ok");
        assert!(report.metrics_stale.is_empty(), "{:?}", report.metrics_stale);

        let Json(metric) = get_metric(State(state), Path("cardinals_readiness".to_string()))
            .await
            .unwrap();
        assert!(!metric.stale);
        assert!(metric.confidence > 0.0);
    }
}
