//! Observability infrastructure for the fleet controller
//!
//! Provides:
//! - Prometheus metrics (cycle latency, cycle and action outcomes, fleet size per archetype)
//! - Structured lifecycle events with tracing

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Histogram buckets for reconcile cycle duration (in seconds). Cycles that
/// provision clusters run for the better part of an hour.
const CYCLE_BUCKETS: &[f64] = &[
    0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0,
];

struct MetricsInner {
    registry: Registry,
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    cycle_failures_total: IntCounter,
    actions_total: IntCounterVec,
    clusters_observed: IntGaugeVec,
    clusters_planned_create: IntGaugeVec,
    clusters_planned_delete: IntGaugeVec,
}

/// Controller metrics for Prometheus exposition
///
/// Clones share the same registry.
#[derive(Clone)]
pub struct ControllerMetrics {
    inner: Arc<MetricsInner>,
}

impl ControllerMetrics {
    /// Create the metric set on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("auto_cluster".to_string()), None)?;

        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "cycle_duration_seconds",
                "Wall time of one reconcile cycle across all archetypes",
            )
            .buckets(CYCLE_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        let cycles_total = IntCounter::new("cycles_total", "Reconcile cycles completed")?;
        registry.register(Box::new(cycles_total.clone()))?;

        let cycle_failures_total = IntCounter::new(
            "cycle_failures_total",
            "Reconcile cycles in which at least one archetype failed",
        )?;
        registry.register(Box::new(cycle_failures_total.clone()))?;

        let actions_total = IntCounterVec::new(
            Opts::new("actions_total", "Executed cluster actions by outcome"),
            &["archetype", "action", "outcome"],
        )?;
        registry.register(Box::new(actions_total.clone()))?;

        let clusters_observed = IntGaugeVec::new(
            Opts::new("clusters_observed", "Clusters observed in the last cycle"),
            &["archetype"],
        )?;
        registry.register(Box::new(clusters_observed.clone()))?;

        let clusters_planned_create = IntGaugeVec::new(
            Opts::new(
                "clusters_planned_create",
                "Clusters the last plan decided to create",
            ),
            &["archetype"],
        )?;
        registry.register(Box::new(clusters_planned_create.clone()))?;

        let clusters_planned_delete = IntGaugeVec::new(
            Opts::new(
                "clusters_planned_delete",
                "Clusters the last plan decided to delete",
            ),
            &["archetype"],
        )?;
        registry.register(Box::new(clusters_planned_delete.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                cycle_duration_seconds,
                cycles_total,
                cycle_failures_total,
                actions_total,
                clusters_observed,
                clusters_planned_create,
                clusters_planned_delete,
            }),
        })
    }

    /// Record a finished cycle
    pub fn observe_cycle(&self, duration_secs: f64, failed: bool) {
        self.inner.cycle_duration_seconds.observe(duration_secs);
        self.inner.cycles_total.inc();
        if failed {
            self.inner.cycle_failures_total.inc();
        }
    }

    /// Record observed and planned cluster counts for an archetype
    pub fn set_archetype_counts(&self, archetype: &str, observed: usize, create: usize, delete: usize) {
        self.inner
            .clusters_observed
            .with_label_values(&[archetype])
            .set(observed as i64);
        self.inner
            .clusters_planned_create
            .with_label_values(&[archetype])
            .set(create as i64);
        self.inner
            .clusters_planned_delete
            .with_label_values(&[archetype])
            .set(delete as i64);
    }

    /// Count one executed action
    pub fn inc_action(&self, archetype: &str, action: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner
            .actions_total
            .with_label_values(&[archetype, action, outcome])
            .inc();
    }

    pub fn cycles_total(&self) -> u64 {
        self.inner.cycles_total.get()
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for controller lifecycle events
///
/// Every event carries an `event` field so log pipelines can filter on it.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    controller: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("auto-cluster")
    }
}

impl StructuredLogger {
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
        }
    }

    pub fn log_startup(&self, version: &str, archetypes: usize, dry_run: bool) {
        info!(
            event = "controller_started",
            controller = %self.controller,
            version = %version,
            archetypes = archetypes,
            dry_run = dry_run,
            "Fleet controller started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            controller = %self.controller,
            reason = %reason,
            "Fleet controller shutting down"
        );
    }

    /// Log the end of a reconcile cycle
    pub fn log_cycle_completed(&self, cycle: u64, archetypes: usize, failures: usize, elapsed_ms: u128) {
        if failures == 0 {
            info!(
                event = "cycle_completed",
                controller = %self.controller,
                cycle = cycle,
                archetypes = archetypes,
                failures = failures,
                elapsed_ms = elapsed_ms,
                "Reconcile cycle completed"
            );
        } else {
            warn!(
                event = "cycle_completed",
                controller = %self.controller,
                cycle = cycle,
                archetypes = archetypes,
                failures = failures,
                elapsed_ms = elapsed_ms,
                "Reconcile cycle completed with failures"
            );
        }
    }

    pub fn log_cluster_created(&self, archetype: &str, cluster: &str) {
        info!(
            event = "cluster_created",
            controller = %self.controller,
            archetype = %archetype,
            cluster = %cluster,
            "Cluster created"
        );
    }

    pub fn log_cluster_deleted(&self, archetype: &str, cluster: &str) {
        info!(
            event = "cluster_deleted",
            controller = %self.controller,
            archetype = %archetype,
            cluster = %cluster,
            "Cluster deleted"
        );
    }

    pub fn log_action_failed(&self, archetype: &str, action: &str, cluster: &str, error: &str) {
        warn!(
            event = "action_failed",
            controller = %self.controller,
            archetype = %archetype,
            action = %action,
            cluster = %cluster,
            error = %error,
            "Cluster action failed"
        );
    }

    pub fn log_primary_promoted(&self, archetype: &str, cluster: &str, previous: Option<&str>) {
        info!(
            event = "primary_promoted",
            controller = %self.controller,
            archetype = %archetype,
            cluster = %cluster,
            previous = ?previous,
            "Primary cluster promoted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_encode_contains_prefixed_names() {
        let metrics = ControllerMetrics::new().unwrap();
        metrics.observe_cycle(12.5, false);
        metrics.set_archetype_counts("kscout", 2, 1, 0);
        metrics.inc_action("kscout", "create", true);

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("auto_cluster_cycles_total 1"));
        assert!(text.contains("auto_cluster_clusters_observed{archetype=\"kscout\"} 2"));
        assert!(text.contains("auto_cluster_cycle_duration_seconds_bucket"));
        assert!(text.contains(
            "auto_cluster_actions_total{action=\"create\",archetype=\"kscout\",outcome=\"success\"} 1"
        ));
    }

    #[test]
    fn test_failed_cycles_counted_separately() {
        let metrics = ControllerMetrics::new().unwrap();
        metrics.observe_cycle(1.0, true);
        metrics.observe_cycle(1.0, false);

        assert_eq!(metrics.cycles_total(), 2);
        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("auto_cluster_cycle_failures_total 1"));
    }

    #[test]
    fn test_instances_do_not_share_registries() {
        let first = ControllerMetrics::new().unwrap();
        let second = ControllerMetrics::new().unwrap();
        first.observe_cycle(1.0, false);

        assert_eq!(first.cycles_total(), 1);
        assert_eq!(second.cycles_total(), 0);
    }

    #[test]
    fn test_logger_events_do_not_panic() {
        let logger = StructuredLogger::new("test-controller");
        logger.log_startup("0.1.0", 2, true);
        logger.log_cycle_completed(1, 2, 0, 15);
        logger.log_cycle_completed(2, 2, 1, 15);
        logger.log_cluster_created("kscout", "kscout-ab12");
        logger.log_cluster_deleted("kscout", "kscout-zz99");
        logger.log_action_failed("kscout", "create", "kscout-ab12", "exit status: 1");
        logger.log_primary_promoted("kscout", "kscout-ab12", None);
        logger.log_shutdown("test");
    }
}
