//! Reconcile loop
//!
//! One cycle walks every archetype in order: resolve status, compute the
//! plan, then execute it unless running dry. The first cycle starts
//! immediately and each following one starts `interval` after the previous
//! cycle finished. Shutdown is only observed between cycles; an in-flight
//! cycle always runs to completion.

use crate::archetype::ArchetypeSpec;
use crate::error::{ConfigError, CycleError, ReconcileError};
use crate::executor::{Action, ActionFailure, ExecutionReport, Executor};
use crate::health::{components, HealthRegistry};
use crate::inventory::{resolve_status, InventorySource};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::plan::{compute_plan, ArchetypePlan};
use crate::settings::{ControllerSettings, DEFAULT_RECONCILE_INTERVAL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one archetype during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub name_prefix: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observed_clusters: Vec<String>,
    #[serde(default)]
    pub plan: Option<ArchetypePlan>,
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub execution: Option<ExecutionReport>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CycleReport {
    fn start(spec: &ArchetypeSpec, dry_run: bool) -> Self {
        Self {
            name_prefix: spec.name_prefix.clone(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            observed_clusters: Vec::new(),
            plan: None,
            primary: None,
            execution: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.execution.as_ref().map_or(true, |e| e.is_success())
    }
}

/// Point-in-time view of the controller served by the status API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub dry_run: bool,
    pub last_cycle_started_at: Option<DateTime<Utc>>,
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
    /// Latest report per archetype prefix
    pub archetypes: BTreeMap<String, CycleReport>,
    /// Last promoted primary per archetype prefix
    pub primaries: BTreeMap<String, String>,
}

/// Shared controller state; clones see the same snapshot
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn primary(&self, prefix: &str) -> Option<String> {
        self.inner.read().await.primaries.get(prefix).cloned()
    }

    async fn set_primary(&self, prefix: &str, cluster: &str) {
        self.inner
            .write()
            .await
            .primaries
            .insert(prefix.to_string(), cluster.to_string());
    }

    async fn begin_cycle(&self, dry_run: bool) {
        let mut state = self.inner.write().await;
        state.dry_run = dry_run;
        state.last_cycle_started_at = Some(Utc::now());
    }

    async fn record(&self, report: CycleReport) {
        self.inner
            .write()
            .await
            .archetypes
            .insert(report.name_prefix.clone(), report);
    }

    /// Close the cycle and return its number
    async fn finish_cycle(&self, failed: bool) -> u64 {
        let mut state = self.inner.write().await;
        state.cycles_completed += 1;
        if failed {
            state.cycles_failed += 1;
        }
        state.last_cycle_finished_at = Some(Utc::now());
        state.cycles_completed
    }
}

/// Periodic reconciler for all configured archetypes
pub struct Controller {
    inventory: Arc<dyn InventorySource>,
    executor: Executor,
    archetypes: Vec<ArchetypeSpec>,
    interval: Duration,
    dry_run: bool,
    exit_on_cycle_failure: bool,
    state: ControllerState,
    health: HealthRegistry,
    metrics: Option<ControllerMetrics>,
    logger: StructuredLogger,
}

impl Controller {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    pub fn state(&self) -> ControllerState {
        self.state.clone()
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// Returns an error only when `exit_on_cycle_failure` is set and a cycle
    /// failed.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ReconcileError> {
        info!(
            interval_secs = self.interval.as_secs(),
            archetypes = self.archetypes.len(),
            dry_run = self.dry_run,
            "Starting reconcile loop"
        );

        loop {
            let (cycle, failures) = self.run_cycle().await;

            if !failures.is_empty() && self.exit_on_cycle_failure {
                error!(cycle, failures = failures.len(), "Reconcile cycle failed, stopping");
                self.health
                    .set_unhealthy(components::RECONCILER, format!("cycle {} failed", cycle))
                    .await;
                self.health.set_ready(false).await;
                return Err(ReconcileError::CycleFailed { cycle, failures });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down reconcile loop");
                    break;
                }
            }
        }

        self.health.set_ready(false).await;
        Ok(())
    }

    /// Run a single cycle; any archetype failure is an error
    pub async fn run_once(&self) -> Result<(), ReconcileError> {
        let (cycle, failures) = self.run_cycle().await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::CycleFailed { cycle, failures })
        }
    }

    /// Reconcile every archetype once, returning the cycle number and the
    /// archetypes that failed
    pub async fn run_cycle(&self) -> (u64, Vec<CycleError>) {
        let start = Instant::now();
        self.state.begin_cycle(self.dry_run).await;

        let mut failures = Vec::new();
        for spec in &self.archetypes {
            let (report, failure) = self.reconcile_archetype(spec).await;
            self.state.record(report).await;
            if let Some(failure) = failure {
                warn!(archetype = %failure.prefix(), error = %failure, "Archetype pass failed");
                failures.push(failure);
            }
        }

        let elapsed = start.elapsed();
        let failed = !failures.is_empty();
        let cycle = self.state.finish_cycle(failed).await;

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle(elapsed.as_secs_f64(), failed);
        }
        self.logger.log_cycle_completed(
            cycle,
            self.archetypes.len(),
            failures.len(),
            elapsed.as_millis(),
        );

        self.health.set_healthy(components::RECONCILER).await;
        self.health.set_ready(true).await;

        (cycle, failures)
    }

    async fn reconcile_archetype(&self, spec: &ArchetypeSpec) -> (CycleReport, Option<CycleError>) {
        let prefix = spec.name_prefix.as_str();
        let mut report = CycleReport::start(spec, self.dry_run);

        let status = match resolve_status(self.inventory.as_ref(), spec).await {
            Ok(status) => {
                self.health.set_healthy(components::INVENTORY).await;
                status
            }
            Err(source) => {
                self.health
                    .set_degraded(components::INVENTORY, source.to_string())
                    .await;
                let failure = CycleError::Inventory {
                    prefix: prefix.to_string(),
                    source,
                };
                report.error = Some(failure.to_string());
                report.finished_at = Some(Utc::now());
                return (report, Some(failure));
            }
        };
        report.observed_clusters = status.cluster_names();

        let plan = compute_plan(spec, &status);
        if let Some(metrics) = &self.metrics {
            metrics.set_archetype_counts(
                prefix,
                status.len(),
                plan.create_clusters,
                plan.delete_clusters.len(),
            );
        }
        info!(archetype = %prefix, observed = status.len(), plan = %plan, "Computed plan");

        if self.dry_run {
            info!(archetype = %prefix, "Dry run, plan not executed");
            report.primary = plan.primary.clone();
            report.plan = Some(plan);
            report.finished_at = Some(Utc::now());
            return (report, None);
        }

        let mut execution = self.executor.execute(spec, &status, &plan).await;
        let mut attempted = plan.action_count();
        if spec.install.helm_chart.is_some() {
            attempted += execution.created.len();
        }

        let primary = plan
            .primary
            .clone()
            .or_else(|| execution.created.last().cloned());
        if let Some(primary) = &primary {
            if self.promote_if_changed(spec, primary, &mut execution).await {
                attempted += 1;
            }
        }
        self.record_actions(prefix, &execution);

        let failure = if execution.is_success() {
            self.health.set_healthy(components::EXECUTOR).await;
            None
        } else {
            let failure = CycleError::Execution {
                prefix: prefix.to_string(),
                failed: execution.failures.len(),
                attempted,
            };
            self.health
                .set_degraded(components::EXECUTOR, failure.to_string())
                .await;
            report.error = Some(failure.to_string());
            Some(failure)
        };

        report.primary = primary;
        report.plan = Some(plan);
        report.execution = Some(execution);
        report.finished_at = Some(Utc::now());
        (report, failure)
    }

    /// Promote `primary` when it differs from the last promoted cluster.
    /// Returns whether a promotion was attempted.
    async fn promote_if_changed(
        &self,
        spec: &ArchetypeSpec,
        primary: &str,
        execution: &mut ExecutionReport,
    ) -> bool {
        let prefix = spec.name_prefix.as_str();
        let previous = self.state.primary(prefix).await;
        if previous.as_deref() == Some(primary) {
            debug!(archetype = %prefix, cluster = %primary, "Primary unchanged");
            return false;
        }

        match self.executor.promote(spec, primary).await {
            Ok(()) => {
                self.logger
                    .log_primary_promoted(prefix, primary, previous.as_deref());
                self.state.set_primary(prefix, primary).await;
            }
            Err(e) => {
                let failure = ActionFailure::new(Action::Promote, primary, &e);
                self.logger
                    .log_action_failed(prefix, Action::Promote.as_str(), primary, &failure.error);
                execution.failures.push(failure);
            }
        }
        true
    }

    fn record_actions(&self, prefix: &str, execution: &ExecutionReport) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        for _ in &execution.created {
            metrics.inc_action(prefix, Action::Create.as_str(), true);
        }
        for _ in &execution.deleted {
            metrics.inc_action(prefix, Action::Delete.as_str(), true);
        }
        for failure in &execution.failures {
            metrics.inc_action(prefix, failure.action.as_str(), false);
        }
    }
}

/// Builder for [`Controller`]
pub struct ControllerBuilder {
    inventory: Option<Arc<dyn InventorySource>>,
    executor: Option<Executor>,
    archetypes: Vec<ArchetypeSpec>,
    interval: Duration,
    dry_run: bool,
    exit_on_cycle_failure: bool,
    state: ControllerState,
    health: HealthRegistry,
    metrics: Option<ControllerMetrics>,
    logger: StructuredLogger,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            inventory: None,
            executor: None,
            archetypes: Vec::new(),
            interval: DEFAULT_RECONCILE_INTERVAL,
            dry_run: false,
            exit_on_cycle_failure: false,
            state: ControllerState::new(),
            health: HealthRegistry::new(),
            metrics: None,
            logger: StructuredLogger::default(),
        }
    }

    /// Take archetypes, interval and policy flags from settings
    pub fn settings(mut self, settings: &ControllerSettings) -> Self {
        self.archetypes = settings.archetypes.clone();
        self.interval = settings.reconcile_interval;
        self.dry_run = settings.dry_run;
        self.exit_on_cycle_failure = settings.exit_on_cycle_failure;
        self
    }

    pub fn inventory(mut self, inventory: Arc<dyn InventorySource>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn archetypes(mut self, archetypes: Vec<ArchetypeSpec>) -> Self {
        self.archetypes = archetypes;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn exit_on_cycle_failure(mut self, exit: bool) -> Self {
        self.exit_on_cycle_failure = exit;
        self
    }

    /// Share state with the status API
    pub fn state(mut self, state: ControllerState) -> Self {
        self.state = state;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<Controller, ConfigError> {
        let inventory = self
            .inventory
            .ok_or_else(|| ConfigError::Invalid("inventory source is required".to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| ConfigError::Invalid("executor is required".to_string()))?;
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reconcile interval must be greater than zero".to_string(),
            ));
        }

        Ok(Controller {
            inventory,
            executor,
            archetypes: self.archetypes,
            interval: self.interval,
            dry_run: self.dry_run,
            exit_on_cycle_failure: self.exit_on_cycle_failure,
            state: self.state,
            health: self.health,
            metrics: self.metrics,
            logger: self.logger,
        })
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
