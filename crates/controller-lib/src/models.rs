//! Core data models for the fleet controller

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A running compute instance observed in the cloud inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    /// Value of the instance's `Name` tag
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created_at,
        }
    }
}

/// A logical cluster, identified purely by the naming convention of its instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub name: String,
    /// Earliest `created_at` among the member instances
    pub created_on: DateTime<Utc>,
    pub instances: Vec<Instance>,
}

impl ClusterStatus {
    /// Age of the cluster at `now`. Creation times in the future count as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let age = now - self.created_on;
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }
}

/// Observed state of every cluster belonging to one archetype
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeStatus {
    pub clusters: Vec<ClusterStatus>,
}

impl ArchetypeStatus {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Names of all observed clusters
    pub fn cluster_names(&self) -> Vec<String> {
        self.clusters.iter().map(|c| c.name.clone()).collect()
    }

    /// Clusters sorted ascending by `(created_on, name)`, oldest first
    pub fn sorted_by_age(&self) -> Vec<&ClusterStatus> {
        let mut sorted: Vec<&ClusterStatus> = self.clusters.iter().collect();
        sorted.sort_by(|a, b| {
            a.created_on
                .cmp(&b.created_on)
                .then_with(|| a.name.cmp(&b.name))
        });
        sorted
    }
}

/// Credentials written by the provisioning tool after a successful create
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterAccess {
    pub cluster_name: String,
    pub kubeadmin_password: String,
    pub kubeconfig_path: String,
}

impl std::fmt::Debug for ClusterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterAccess")
            .field("cluster_name", &self.cluster_name)
            .field("kubeadmin_password", &"REDACTED")
            .field("kubeconfig_path", &self.kubeconfig_path)
            .finish()
    }
}
