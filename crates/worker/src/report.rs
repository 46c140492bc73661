use blaze_core::calc::decay::DecayAction;
use blaze_core::domain::metric::DerivedMetric;
use blaze_core::poller::TickOutcome;

/// Broadcast subscriber: one log line per metric, escalated when the
/// data behind it has decayed.
pub fn log_metric(metric: &DerivedMetric) -> anyhow::Result<()> {
    let action = DecayAction::for_confidence(metric.confidence);
    let label = metric.label.as_deref().unwrap_or("-");

    if action == DecayAction::None && !metric.stale {
        tracing::info!(
            metric = %metric.name,
            value = metric.value,
            label,
            confidence = metric.confidence,
            "metric updated"
        );
    } else {
        tracing::warn!(
            metric = %metric.name,
            value = metric.value,
            label,
            stale = metric.stale,
            confidence = metric.confidence,
            action = action.as_str(),
            "metric degraded"
        );
    }
    Ok(())
}

/// Returns how many sources failed.
pub fn log_outcomes(outcomes: &[(String, TickOutcome)]) -> usize {
    let mut failed = 0;
    for (source, outcome) in outcomes {
        match outcome {
            TickOutcome::Fresh { metrics } => {
                tracing::info!(%source, metrics, "source refreshed");
            }
            TickOutcome::Stale { error, metrics } => {
                failed += 1;
                tracing::warn!(%source, kind = error.kind(), error = %error, metrics, "source refresh failed");
            }
            TickOutcome::Discarded => {
                tracing::debug!(%source, "source stopped during refresh; result discarded");
            }
            TickOutcome::Skipped => {
                tracing::debug!(%source, "fetch already in flight; refresh skipped");
            }
        }
    }
    failed
}
