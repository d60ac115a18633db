//! Controller library for the auto-cluster fleet reconciler
//!
//! This crate provides the core functionality for:
//! - Grouping tagged compute instances into logical clusters
//! - Planning cluster creation, garbage collection and primary rotation
//! - Driving the external provisioning tool for each planned action
//! - The periodic reconcile loop, health checks and observability

pub mod archetype;
pub mod error;
pub mod executor;
pub mod health;
pub mod inventory;
pub mod models;
pub mod notify;
pub mod observability;
pub mod plan;
pub mod reconcile;
pub mod settings;

pub use archetype::ArchetypeSpec;
pub use error::{ConfigError, CycleError, ExecutionError, InventoryError, ReconcileError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use executor::{Action, ActionFailure, ExecutionReport, Executor};
pub use inventory::{AwsCliInventory, InventorySource, StaticInventory};
pub use models::*;
pub use notify::{Notifier, WebhookNotifier};
pub use observability::{ControllerMetrics, StructuredLogger};
pub use plan::{compute_plan, compute_plan_at, ArchetypePlan};
pub use reconcile::{Controller, ControllerBuilder, ControllerState, CycleReport, StatusSnapshot};
pub use settings::ControllerSettings;
