//! Observability hooks for the change engine.
//!
//! Implement [`ChangeMetrics`] to feed engine activity into your monitoring
//! system:
//!
//! ```ignore
//! use change_kit::observability::ChangeMetrics;
//! use change_kit::ChangeSummary;
//!
//! struct PrometheusMetrics;
//!
//! impl ChangeMetrics for PrometheusMetrics {
//!     fn record_changes(&self, summary: &ChangeSummary) {
//!         // counter!("changes_added").inc_by(summary.adds);
//!     }
//!     // ... implement other methods
//! }
//!
//! // let changes = ChangeSetBuilder::new()
//! //     .with_metrics(Box::new(PrometheusMetrics))
//! //     ...
//! ```
//!
//! Default behavior (if not overridden) is [`LogMetrics`], which logs via the
//! `log` crate. Use [`NoOpMetrics`] to silence it.
//!
//! # Hooks
//!
//! - `record_changes()` - A non-empty change set was emitted
//! - `record_eviction()` - Entries were evicted to respect the size limit
//! - `record_expiry()` - Entries were removed by an expiry timer
//! - `record_error()` - The engine terminated with an error

use crate::change::ChangeSummary;

/// Trait for engine metrics collection.
pub trait ChangeMetrics: Send + Sync {
    /// Record an emitted change set.
    fn record_changes(&self, summary: &ChangeSummary) {
        debug!("Changes emitted: {}", summary);
    }

    /// Record entries evicted by the size limit.
    fn record_eviction(&self, count: usize) {
        debug!("Evicted {} oldest entries", count);
    }

    /// Record entries removed by an expiry timer.
    fn record_expiry(&self, count: usize) {
        debug!("Expired {} entries", count);
    }

    /// Record a terminal error.
    fn record_error(&self, error: &str) {
        warn!("Change stream ERROR: {}", error);
    }
}

/// Default metrics implementation, logging every hook.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl ChangeMetrics for LogMetrics {}

/// Metrics implementation that records nothing.
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl ChangeMetrics for NoOpMetrics {
    fn record_changes(&self, _summary: &ChangeSummary) {}
    fn record_eviction(&self, _count: usize) {}
    fn record_expiry(&self, _count: usize) {}
    fn record_error(&self, _error: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_changes(&ChangeSummary::default());
        metrics.record_eviction(3);
        metrics.record_expiry(1);
        metrics.record_error("boom");
    }

    #[test]
    fn test_log_metrics() {
        let metrics = LogMetrics;
        metrics.record_changes(&ChangeSummary {
            adds: 1,
            ..ChangeSummary::default()
        });
        metrics.record_eviction(2);
    }
}
