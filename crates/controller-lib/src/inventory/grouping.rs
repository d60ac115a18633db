//! Instance to cluster grouping
//!
//! Instances carry names like `kscout-ab12-9kjcx-master-2`, where
//! `kscout-ab12` is the cluster and `kscout` the archetype prefix. The
//! cluster name is recovered by rejoining the `-` separated parts one at a
//! time until the rejoined string starts with the prefix.

use crate::models::{ClusterStatus, Instance};
use std::collections::BTreeMap;

/// Derive the cluster name an instance belongs to, if any.
///
/// A rejoined string equal to the bare prefix only counts when it is the
/// whole instance name: the executor always names clusters
/// `<prefix>-<suffix>`, so `kscout-ab12-master-0` must resolve to
/// `kscout-ab12` rather than `kscout`.
pub fn cluster_name_for(instance_name: &str, name_prefix: &str) -> Option<String> {
    let parts: Vec<&str> = instance_name.split('-').collect();

    for end in 1..=parts.len() {
        let candidate = parts[..end].join("-");
        if !candidate.starts_with(name_prefix) {
            continue;
        }
        if candidate.len() == name_prefix.len() && end < parts.len() {
            continue;
        }
        return Some(candidate);
    }

    None
}

/// Partition instances into clusters for one archetype prefix.
///
/// Instances whose names never match the prefix are skipped. Within a
/// cluster, instances keep their input order and `created_on` is the
/// earliest member creation time. Clusters are returned sorted by name.
pub fn group_instances(instances: &[Instance], name_prefix: &str) -> Vec<ClusterStatus> {
    let mut clusters: BTreeMap<String, ClusterStatus> = BTreeMap::new();

    for instance in instances {
        let Some(cluster_name) = cluster_name_for(&instance.name, name_prefix) else {
            continue;
        };

        clusters
            .entry(cluster_name.clone())
            .and_modify(|cluster| {
                if instance.created_at < cluster.created_on {
                    cluster.created_on = instance.created_at;
                }
                cluster.instances.push(instance.clone());
            })
            .or_insert_with(|| ClusterStatus {
                name: cluster_name,
                created_on: instance.created_at,
                instances: vec![instance.clone()],
            });
    }

    clusters.into_values().collect()
}
