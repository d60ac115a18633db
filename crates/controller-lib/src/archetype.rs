//! Archetype specifications
//!
//! An archetype is a family of clusters sharing a name prefix and lifecycle
//! rules. Archetypes are loaded once from configuration and treated as
//! read-only while planning.

use crate::error::ConfigError;
use crate::settings::duration_format;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOUR: u64 = 60 * 60;

/// Desired state for one family of clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeSpec {
    /// Prefix placed before every cluster name. Clusters without this
    /// prefix are invisible to the archetype.
    pub name_prefix: String,

    #[serde(default)]
    pub replicas: ReplicaPolicy,

    /// One time setup performed when a cluster is first created
    #[serde(default)]
    pub install: InstallSpec,

    /// Hook run when a different cluster becomes primary
    #[serde(default)]
    pub promote: PromoteSpec,
}

/// Replica count and lifecycle bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaPolicy {
    #[serde(default = "default_replica_count")]
    pub count: usize,

    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Default for ReplicaPolicy {
    fn default() -> Self {
        Self {
            count: default_replica_count(),
            lifecycle: Lifecycle::default(),
        }
    }
}

/// Cluster ages at which lifecycle operations happen. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Oldest a cluster may be before it is forcefully deleted
    #[serde(default = "default_delete_after", with = "duration_format")]
    pub delete_after: Duration,

    /// Oldest a cluster may be and still serve as primary
    #[serde(default = "default_oldest_primary", with = "duration_format")]
    pub oldest_primary: Duration,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            delete_after: default_delete_after(),
            oldest_primary: default_oldest_primary(),
        }
    }
}

/// Helm chart installed once on newly created clusters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallSpec {
    /// Chart reference or Git URI of a chart repository
    #[serde(default)]
    pub helm_chart: Option<String>,

    /// Release name, defaults to the archetype's name prefix
    #[serde(default)]
    pub release: Option<String>,
}

/// External command that repoints traffic at a new primary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromoteSpec {
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_replica_count() -> usize {
    2
}

fn default_delete_after() -> Duration {
    Duration::from_secs(42 * HOUR)
}

fn default_oldest_primary() -> Duration {
    Duration::from_secs(12 * HOUR)
}

impl ArchetypeSpec {
    /// Create a spec with default replica policy
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            replicas: ReplicaPolicy::default(),
            install: InstallSpec::default(),
            promote: PromoteSpec::default(),
        }
    }

    pub fn with_replica_count(mut self, count: usize) -> Self {
        self.replicas.count = count;
        self
    }

    pub fn with_delete_after(mut self, delete_after: Duration) -> Self {
        self.replicas.lifecycle.delete_after = delete_after;
        self
    }

    pub fn with_oldest_primary(mut self, oldest_primary: Duration) -> Self {
        self.replicas.lifecycle.oldest_primary = oldest_primary;
        self
    }

    pub fn with_helm_chart(mut self, chart: impl Into<String>) -> Self {
        self.install.helm_chart = Some(chart.into());
        self
    }

    pub fn with_promote_command(mut self, command: Vec<String>) -> Self {
        self.promote.command = command;
        self
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.count
    }

    pub fn delete_after(&self) -> Duration {
        self.replicas.lifecycle.delete_after
    }

    pub fn oldest_primary(&self) -> Duration {
        self.replicas.lifecycle.oldest_primary
    }

    /// Helm release name used for the post-create install
    pub fn release_name(&self) -> &str {
        self.install
            .release
            .as_deref()
            .unwrap_or(&self.name_prefix)
    }

    /// Check required fields. `oldest_primary > delete_after` is allowed;
    /// the planner handles it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "archetype name_prefix must not be empty".to_string(),
            ));
        }
        // Generated cluster names are lowercase and grouping is case sensitive
        if self.name_prefix != self.name_prefix.to_lowercase() {
            return Err(ConfigError::Invalid(format!(
                "archetype {}: name_prefix must be lowercase",
                self.name_prefix
            )));
        }
        if self.delete_after().is_zero() {
            return Err(ConfigError::Invalid(format!(
                "archetype {}: replicas.lifecycle.delete_after must be greater than zero",
                self.name_prefix
            )));
        }
        if self.oldest_primary().is_zero() {
            return Err(ConfigError::Invalid(format!(
                "archetype {}: replicas.lifecycle.oldest_primary must be greater than zero",
                self.name_prefix
            )));
        }
        if let Some(chart) = &self.install.helm_chart {
            if chart.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "archetype {}: install.helm_chart must not be blank",
                    self.name_prefix
                )));
            }
        }
        Ok(())
    }
}
