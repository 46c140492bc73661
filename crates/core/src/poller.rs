//! Interval-driven polling of sources.
//!
//! Each running source owns one loop task. A tick runs Fetch → Cache update →
//! Calculate → Broadcast. At most one fetch per source is in flight, across
//! loop ticks, manual ticks and restarts; a tick that finds a fetch still
//! running is skipped. Fetch failures leave the cache untouched and surface as
//! `stale` metrics.

use crate::broadcast::Broadcaster;
use crate::cache::SnapshotCache;
use crate::calc::{self, Calculator};
use crate::domain::metric::DerivedMetric;
use crate::domain::snapshot::Snapshot;
use crate::domain::source::Source;
use crate::fetch::error::FetchError;
use crate::fetch::{fetch_bounded, SourceFetcher};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollerError {
    #[error("source '{0}': polling interval must be > 0")]
    InvalidInterval(String),

    #[error("source '{0}': fetch timeout must be > 0")]
    InvalidTimeout(String),

    #[error("source '{0}' is already being polled")]
    AlreadyRunning(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fetch succeeded; the cache holds a new snapshot.
    Fresh { metrics: usize },
    /// Fetch failed; metrics were broadcast from the previous snapshot, flagged stale.
    Stale { error: FetchError, metrics: usize },
    /// The source was stopped while the fetch was in flight; nothing was written.
    Discarded,
    /// Another fetch for the source was still in flight; nothing was fetched.
    Skipped,
}

/// Everything a tick needs, shared between the poller and its tasks.
#[derive(Debug)]
pub(crate) struct TickContext {
    pub(crate) fetcher: Arc<dyn SourceFetcher>,
    pub(crate) cache: Arc<SnapshotCache>,
    pub(crate) calculator: Arc<Calculator>,
    pub(crate) metrics: Arc<Broadcaster<DerivedMetric>>,
    pub(crate) snapshots: Arc<Broadcaster<Snapshot>>,
}

/// `false` once the owning loop is stopped. Held from the cache write through
/// the broadcast, so `stop` and a tick's side effects never interleave.
type ActiveFlag = Arc<Mutex<bool>>;

struct PollHandle {
    active: ActiveFlag,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("active", &is_active(&self.active))
            .finish()
    }
}

/// Exclusive claim on a source's in-flight flag; released on drop, even if
/// the tick panics or is cancelled.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Poller {
    ctx: Arc<TickContext>,
    running: Mutex<HashMap<String, PollHandle>>,
    /// One flag per source key, kept across stop/start so a restarted loop
    /// still sees a fetch left over from the previous one.
    in_flight: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl Poller {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        cache: Arc<SnapshotCache>,
        calculator: Arc<Calculator>,
        metrics: Arc<Broadcaster<DerivedMetric>>,
        snapshots: Arc<Broadcaster<Snapshot>>,
    ) -> Self {
        Self {
            ctx: Arc::new(TickContext {
                fetcher,
                cache,
                calculator,
                metrics,
                snapshots,
            }),
            running: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Starts polling `source` on its interval; the first tick fires immediately.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, source: Source) -> Result<(), PollerError> {
        if source.interval.is_zero() {
            return Err(PollerError::InvalidInterval(source.key));
        }
        if source.timeout.is_zero() {
            return Err(PollerError::InvalidTimeout(source.key));
        }

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.contains_key(&source.key) {
            return Err(PollerError::AlreadyRunning(source.key));
        }

        let key = source.key.clone();
        let active: ActiveFlag = Arc::new(Mutex::new(true));
        tracing::info!(
            source = %key,
            interval_ms = source.interval.as_millis() as u64,
            timeout_ms = source.timeout.as_millis() as u64,
            fetcher = self.ctx.fetcher.fetcher_name(),
            "poller started"
        );
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.ctx),
            Arc::new(source),
            Arc::clone(&active),
            self.in_flight_flag(&key),
        ));
        running.insert(key, PollHandle { active, task });
        Ok(())
    }

    /// Stops polling `key`. Once this returns, no tick fires, and a fetch
    /// still in flight is neither cached nor broadcast. If a tick is
    /// mid-broadcast, this waits for it to finish; do not call it from a
    /// subscriber of the same source. Returns `false` if the source was not
    /// running.
    pub fn stop(&self, key: &str) -> bool {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        let Some(handle) = handle else {
            return false;
        };

        *handle.active.lock().unwrap_or_else(PoisonError::into_inner) = false;
        handle.task.abort();
        tracing::info!(source = %key, "poller stopped");
        true
    }

    pub fn stop_all(&self) {
        let keys: Vec<String> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for key in keys {
            self.stop(&key);
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn running_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Runs one full tick for `source` right now.
    ///
    /// Returns [`TickOutcome::Skipped`] if a fetch for the source is already
    /// in flight. While a loop is running for the source, the tick is bound
    /// to it: stopping the loop discards this tick's result. Without a loop
    /// the tick always writes, which is how one-shot refreshes work.
    pub async fn tick_once(&self, source: &Source) -> TickOutcome {
        let flag = self.in_flight_flag(&source.key);
        let Some(_claim) = InFlight::try_claim(&flag) else {
            tracing::debug!(source = %source.key, "fetch already in flight; skipping manual tick");
            return TickOutcome::Skipped;
        };

        let active = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&source.key)
            .map(|handle| Arc::clone(&handle.active))
            .unwrap_or_else(|| Arc::new(Mutex::new(true)));
        run_tick(&self.ctx, source, &active).await
    }

    fn in_flight_flag(&self, key: &str) -> Arc<AtomicBool> {
        let mut flags = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(flags.entry(key.to_string()).or_default())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn poll_loop(
    ctx: Arc<TickContext>,
    source: Arc<Source>,
    active: ActiveFlag,
    in_flight: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(source.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !is_active(&active) {
            break;
        }

        let Some(claim) = InFlight::try_claim(&in_flight) else {
            tracing::debug!(source = %source.key, "previous fetch still in flight; skipping tick");
            continue;
        };

        let ctx = Arc::clone(&ctx);
        let source = Arc::clone(&source);
        let active = Arc::clone(&active);
        tokio::spawn(async move {
            let _claim = claim;
            run_tick(&ctx, &source, &active).await;
        });
    }
}

async fn run_tick(ctx: &TickContext, source: &Source, active: &Mutex<bool>) -> TickOutcome {
    let t0 = std::time::Instant::now();
    let result = fetch_bounded(ctx.fetcher.as_ref(), source).await;

    // Everything after the fetch happens under the active lock.
    let still_active = active.lock().unwrap_or_else(PoisonError::into_inner);
    if !*still_active {
        tracing::debug!(source = %source.key, "source stopped during fetch; discarding result");
        return TickOutcome::Discarded;
    }

    let now = Utc::now();
    let (fresh_snapshot, error) = match result {
        Ok(payload) => (Some(ctx.cache.put(&source.key, payload, now)), None),
        Err(err) => {
            tracing::warn!(
                source = %source.key,
                kind = err.kind(),
                error = %err,
                "source fetch failed; keeping previous snapshot"
            );
            (None, Some(err))
        }
    };

    let metrics: Vec<DerivedMetric> = ctx
        .calculator
        .metrics_for_source(&source.key)
        .map(|spec| {
            let inputs = ctx.cache.snapshots_for(&spec.sources, now);
            let mut metric = calc::compute(spec, &inputs, now, ctx.calculator.decay());
            if error.is_some() {
                metric.stale = true;
            }
            metric
        })
        .collect();

    if let Some(snapshot) = &fresh_snapshot {
        ctx.snapshots.publish(&source.key, snapshot);
    }
    for metric in &metrics {
        ctx.metrics.publish(&metric.name, metric);
    }
    drop(still_active);

    tracing::debug!(
        source = %source.key,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        metrics = metrics.len(),
        fresh = error.is_none(),
        "tick complete"
    );

    match error {
        None => TickOutcome::Fresh {
            metrics: metrics.len(),
        },
        Some(error) => TickOutcome::Stale {
            error,
            metrics: metrics.len(),
        },
    }
}

fn is_active(active: &Mutex<bool>) -> bool {
    *active.lock().unwrap_or_else(PoisonError::into_inner)
}
