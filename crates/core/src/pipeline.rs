use crate::broadcast::Broadcaster;
use crate::cache::SnapshotCache;
use crate::calc::Calculator;
use crate::domain::contract::PipelineConfig;
use crate::domain::metric::DerivedMetric;
use crate::domain::snapshot::Snapshot;
use crate::domain::source::Source;
use crate::fetch::SourceFetcher;
use crate::poller::{Poller, PollerError, TickOutcome};
use chrono::Utc;
use std::sync::Arc;

/// Wires cache, calculator, broadcasters and poller together for one config.
/// Subscribe to [`Pipeline::metrics`] before [`Pipeline::start_all`]; nothing is replayed.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<SnapshotCache>,
    calculator: Arc<Calculator>,
    metrics: Arc<Broadcaster<DerivedMetric>>,
    snapshots: Arc<Broadcaster<Snapshot>>,
    poller: Poller,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn SourceFetcher>) -> Self {
        let cache = Arc::new(SnapshotCache::new(&config.sources));
        let calculator = Arc::new(Calculator::new(config.metrics.clone()));
        let metrics = Arc::new(Broadcaster::new());
        let snapshots = Arc::new(Broadcaster::new());
        let poller = Poller::new(
            fetcher,
            Arc::clone(&cache),
            Arc::clone(&calculator),
            Arc::clone(&metrics),
            Arc::clone(&snapshots),
        );

        Self {
            config,
            cache,
            calculator,
            metrics,
            snapshots,
            poller,
        }
    }

    /// Starts a poll loop for every configured source. On failure, loops
    /// started by this call are stopped again.
    pub fn start_all(&self) -> Result<(), PollerError> {
        let mut started: Vec<&str> = Vec::new();
        for source in &self.config.sources {
            if let Err(err) = self.poller.start(source.clone()) {
                for key in started {
                    self.poller.stop(key);
                }
                return Err(err);
            }
            started.push(&source.key);
        }
        tracing::info!(sources = self.config.sources.len(), metrics = self.config.metrics.len(), "pipeline started");
        Ok(())
    }

    pub fn stop_all(&self) {
        self.poller.stop_all();
        tracing::info!("pipeline stopped");
    }

    /// Ticks every source once, concurrently, and reports each outcome.
    pub async fn refresh_all(&self) -> Vec<(String, TickOutcome)> {
        let ticks = self.config.sources.iter().map(|source| async move {
            (source.key.clone(), self.poller.tick_once(source).await)
        });
        // Outcomes come back in config order.
        futures::future::join_all(ticks).await
    }

    /// Computes `name` from the current cache contents without fetching.
    pub fn current_metric(&self, name: &str) -> Option<DerivedMetric> {
        let spec = self.calculator.spec(name)?;
        let now = Utc::now();
        let inputs = self.cache.snapshots_for(&spec.sources, now);
        self.calculator.compute(name, &inputs, now)
    }

    pub fn current_metrics(&self) -> Vec<DerivedMetric> {
        self.calculator
            .specs()
            .iter()
            .filter_map(|spec| self.current_metric(&spec.name))
            .collect()
    }

    pub fn snapshot(&self, key: &str) -> Option<Snapshot> {
        self.cache.get(key)
    }

    pub fn sources(&self) -> &[Source] {
        &self.config.sources
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Broadcaster<DerivedMetric>> {
        &self.metrics
    }

    pub fn snapshots(&self) -> &Arc<Broadcaster<Snapshot>> {
        &self.snapshots
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }
}
