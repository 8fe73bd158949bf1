//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the reconciliation engine.
//!
//! # Metrics
//!
//! - `reconcile_full_rebuilds_total` - Full-group rebuild passes
//! - `reconcile_incremental_merges_total` - Incremental merge passes
//! - `reconcile_settlements_total` - Settlements applied
//! - `reconcile_canonical_rows` - Histogram of rows left by a pass

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Full-group rebuild passes
    pub full_rebuilds_total: IntCounter,

    /// Incremental merge passes
    pub incremental_merges_total: IntCounter,

    /// Settlements applied
    pub settlements_total: IntCounter,

    /// Canonical rows left in the scope by a pass
    pub canonical_rows: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let full_rebuilds_total = IntCounter::with_opts(Opts::new(
            "reconcile_full_rebuilds_total",
            "Total full-group rebuild passes",
        ))?;
        registry.register(Box::new(full_rebuilds_total.clone()))?;

        let incremental_merges_total = IntCounter::with_opts(Opts::new(
            "reconcile_incremental_merges_total",
            "Total incremental merge passes",
        ))?;
        registry.register(Box::new(incremental_merges_total.clone()))?;

        let settlements_total = IntCounter::with_opts(Opts::new(
            "reconcile_settlements_total",
            "Total settlements applied",
        ))?;
        registry.register(Box::new(settlements_total.clone()))?;

        let canonical_rows = Histogram::with_opts(
            HistogramOpts::new(
                "reconcile_canonical_rows",
                "Canonical rows left in the scope by a reconciliation pass",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(canonical_rows.clone()))?;

        Ok(Self {
            full_rebuilds_total,
            incremental_merges_total,
            settlements_total,
            canonical_rows,
            registry,
        })
    }

    /// Record a full-group rebuild
    pub fn record_full_rebuild(&self, rows: usize) {
        self.full_rebuilds_total.inc();
        self.canonical_rows.observe(rows as f64);
    }

    /// Record an incremental merge
    pub fn record_incremental_merge(&self, rows: usize) {
        self.incremental_merges_total.inc();
        self.canonical_rows.observe(rows as f64);
    }

    /// Record a settlement
    pub fn record_settlement(&self) {
        self.settlements_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.full_rebuilds_total.get(), 0);
        assert_eq!(metrics.settlements_total.get(), 0);
    }

    #[test]
    fn test_record_passes() {
        let metrics = Metrics::new().unwrap();

        metrics.record_full_rebuild(3);
        metrics.record_incremental_merge(1);
        metrics.record_settlement();

        assert_eq!(metrics.full_rebuilds_total.get(), 1);
        assert_eq!(metrics.incremental_merges_total.get(), 1);
        assert_eq!(metrics.settlements_total.get(), 1);
    }
}
