//! Error types for the fleet controller

use std::path::PathBuf;
use thiserror::Error;

/// Failure to read the cloud inventory
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to run inventory command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inventory command {command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to parse inventory response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid launch time {value:?} for instance {instance}")]
    InvalidLaunchTime { instance: String, value: String },

    #[error("inventory query failed: {0}")]
    Query(String),
}

/// Failure of one create, delete or promote action
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    ToolFailed { tool: String, status: String },

    #[error("{tool} did not finish within {timeout:?}")]
    Timeout {
        tool: String,
        timeout: std::time::Duration,
    },

    #[error("no unique cluster name for prefix {prefix} after {attempts} attempts")]
    NameCollision { prefix: String, attempts: usize },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render install config: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("no state directory for cluster {0}")]
    MissingState(String),
}

/// Configuration problems, fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read pull secret {path}: {source}")]
    PullSecret {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of one archetype pass within a reconcile cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("archetype {prefix}: {source}")]
    Inventory {
        prefix: String,
        #[source]
        source: InventoryError,
    },

    #[error("archetype {prefix}: {failed} of {attempted} actions failed")]
    Execution {
        prefix: String,
        failed: usize,
        attempted: usize,
    },
}

impl CycleError {
    pub fn prefix(&self) -> &str {
        match self {
            CycleError::Inventory { prefix, .. } | CycleError::Execution { prefix, .. } => prefix,
        }
    }
}

/// Reasons the reconcile loop stops with an error
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("reconcile cycle {cycle} failed for {} archetype(s)", .failures.len())]
    CycleFailed {
        cycle: u64,
        failures: Vec<CycleError>,
    },
}
