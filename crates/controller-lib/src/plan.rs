//! Reconciliation planning
//!
//! Computes the delta between an archetype's desired state and its observed
//! clusters. Planning is a pure function of `(spec, status, now)`: it
//! performs no I/O, cannot fail and never mutates the status it is given.
//!
//! The newest cluster is the primary. The passes run in order:
//!
//! 1. Garbage collection: every cluster aged `>= delete_after` is deleted.
//! 2. Primary rotation: if the newest surviving cluster is aged
//!    `>= oldest_primary`, one replacement cluster is created.
//! 3. Replica convergence: surplus clusters are deleted oldest first, a
//!    shortfall is made up with new clusters.

use crate::archetype::ArchetypeSpec;
use crate::models::{ArchetypeStatus, ClusterStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Actions that bring an archetype to its desired state.
///
/// New clusters carry no names; names are assigned at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypePlan {
    pub name_prefix: String,
    /// Clusters to tear down, garbage collected ones first
    pub delete_clusters: Vec<ClusterStatus>,
    /// Number of new clusters to provision
    pub create_clusters: usize,
    /// Existing cluster that remains primary, if any
    pub primary: Option<String>,
    /// The current primary is too old and a replacement is being created
    pub replaces_primary: bool,
}

impl ArchetypePlan {
    /// True when the plan has nothing to do
    pub fn is_empty(&self) -> bool {
        self.delete_clusters.is_empty() && self.create_clusters == 0
    }

    pub fn delete_names(&self) -> Vec<String> {
        self.delete_clusters.iter().map(|c| c.name.clone()).collect()
    }

    /// Total number of create and delete actions
    pub fn action_count(&self) -> usize {
        self.delete_clusters.len() + self.create_clusters
    }
}

impl fmt::Display for ArchetypePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delete_clusters={:?}, create_clusters={}, primary={}",
            self.delete_names(),
            self.create_clusters,
            self.primary.as_deref().unwrap_or("<none>")
        )
    }
}

/// Plan against the current wall clock, captured once
pub fn compute_plan(spec: &ArchetypeSpec, status: &ArchetypeStatus) -> ArchetypePlan {
    compute_plan_at(spec, status, Utc::now())
}

/// Plan as of `now`
pub fn compute_plan_at(
    spec: &ArchetypeSpec,
    status: &ArchetypeStatus,
    now: DateTime<Utc>,
) -> ArchetypePlan {
    let sorted = status.sorted_by_age();
    let age_of = |c: &ClusterStatus| c.age(now).to_std().unwrap_or_default();

    let mut plan = ArchetypePlan {
        name_prefix: spec.name_prefix.clone(),
        ..Default::default()
    };
    let mut deleted: HashSet<&str> = HashSet::new();
    let mut candidate: Option<&ClusterStatus> = sorted.last().copied();

    // Garbage collection
    for cluster in &sorted {
        if age_of(cluster) >= spec.delete_after() {
            plan.delete_clusters.push((*cluster).clone());
            deleted.insert(cluster.name.as_str());
        }
    }
    if candidate.is_some_and(|c| deleted.contains(c.name.as_str())) {
        candidate = None;
    }

    // Primary rotation. An archetype scaled to zero has no primary to replace.
    if let Some(primary) = candidate {
        if spec.replica_count() > 0 && age_of(primary) >= spec.oldest_primary() {
            candidate = None;
            plan.create_clusters += 1;
            plan.replaces_primary = true;
        }
    }

    // Replica convergence
    let after_count = status.len() + plan.create_clusters - plan.delete_clusters.len();
    if after_count > spec.replica_count() {
        let mut excess = after_count - spec.replica_count();

        for cluster in &sorted {
            if excess == 0 {
                break;
            }
            if deleted.contains(cluster.name.as_str()) {
                continue;
            }
            plan.delete_clusters.push((*cluster).clone());
            deleted.insert(cluster.name.as_str());
            excess -= 1;
        }

        // Surplus left once every cluster is deleted cancels pending creations
        let cancelled = excess.min(plan.create_clusters);
        plan.create_clusters -= cancelled;

        if candidate.is_some_and(|c| deleted.contains(c.name.as_str())) {
            candidate = None;
        }
    } else if after_count < spec.replica_count() {
        plan.create_clusters += spec.replica_count() - after_count;
    }

    if plan.create_clusters == 0 {
        plan.replaces_primary = false;
    }
    plan.primary = candidate.map(|c| c.name.clone());
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Instance;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::time::Duration as StdDuration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn hours(h: u64) -> StdDuration {
        StdDuration::from_secs(h * 3600)
    }

    fn cluster(name: &str, age: Duration) -> ClusterStatus {
        let created_on = now() - age;
        ClusterStatus {
            name: name.to_string(),
            created_on,
            instances: vec![Instance::new(format!("{}-x1y2z-master-0", name), created_on)],
        }
    }

    fn status(clusters: Vec<ClusterStatus>) -> ArchetypeStatus {
        ArchetypeStatus { clusters }
    }

    fn spec(replicas: usize, delete_after: u64, oldest_primary: u64) -> ArchetypeSpec {
        ArchetypeSpec::new("kscout")
            .with_replica_count(replicas)
            .with_delete_after(hours(delete_after))
            .with_oldest_primary(hours(oldest_primary))
    }

    #[test]
    fn test_empty_status_creates_replicas() {
        let plan = compute_plan_at(&spec(2, 42, 12), &status(vec![]), now());

        assert_eq!(plan.create_clusters, 2);
        assert!(plan.delete_clusters.is_empty());
        assert!(plan.primary.is_none());
        assert!(!plan.replaces_primary);
    }

    #[test]
    fn test_garbage_collects_and_keeps_young_primary() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(50)),
            cluster("kscout-bbbb", Duration::hours(10)),
            cluster("kscout-cccc", Duration::hours(5)),
        ]);

        let plan = compute_plan_at(&spec(2, 42, 12), &s, now());

        assert_eq!(plan.delete_names(), vec!["kscout-aaaa"]);
        assert_eq!(plan.create_clusters, 0);
        assert_eq!(plan.primary.as_deref(), Some("kscout-cccc"));
    }

    #[test]
    fn test_stale_primary_rotates() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(30)),
            cluster("kscout-bbbb", Duration::hours(13)),
        ]);

        let plan = compute_plan_at(&spec(2, 42, 12), &s, now());

        assert_eq!(plan.create_clusters, 1);
        assert_eq!(plan.delete_names(), vec!["kscout-aaaa"]);
        assert!(plan.primary.is_none());
        assert!(plan.replaces_primary);
    }

    #[test]
    fn test_age_bounds_are_inclusive() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(42)),
            cluster("kscout-bbbb", Duration::hours(12)),
        ]);

        let plan = compute_plan_at(&spec(2, 42, 12), &s, now());

        assert_eq!(plan.delete_names(), vec!["kscout-aaaa"]);
        assert_eq!(plan.create_clusters, 1);
        assert!(plan.replaces_primary);
        assert!(plan.primary.is_none());
    }

    #[test]
    fn test_excess_deleted_oldest_first_with_name_tiebreak() {
        let s = status(vec![
            cluster("kscout-eeee", Duration::hours(1)),
            cluster("kscout-bbbb", Duration::hours(1)),
            cluster("kscout-dddd", Duration::hours(1)),
            cluster("kscout-aaaa", Duration::hours(1)),
            cluster("kscout-cccc", Duration::hours(1)),
        ]);

        let plan = compute_plan_at(&spec(2, 42, 12), &s, now());

        assert_eq!(
            plan.delete_names(),
            vec!["kscout-aaaa", "kscout-bbbb", "kscout-cccc"]
        );
        assert_eq!(plan.create_clusters, 0);
        assert_eq!(plan.primary.as_deref(), Some("kscout-eeee"));
    }

    #[test]
    fn test_all_garbage_collected() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(60)),
            cluster("kscout-bbbb", Duration::hours(45)),
        ]);

        let plan = compute_plan_at(&spec(2, 42, 12), &s, now());

        assert_eq!(plan.delete_names(), vec!["kscout-aaaa", "kscout-bbbb"]);
        assert_eq!(plan.create_clusters, 2);
        assert!(plan.primary.is_none());
        assert!(!plan.replaces_primary);
    }

    #[test]
    fn test_zero_replicas_deletes_everything_without_rotation() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(20)),
            cluster("kscout-bbbb", Duration::hours(13)),
        ]);

        let plan = compute_plan_at(&spec(0, 42, 12), &s, now());

        assert_eq!(plan.delete_names(), vec!["kscout-aaaa", "kscout-bbbb"]);
        assert_eq!(plan.create_clusters, 0);
        assert!(plan.primary.is_none());
    }

    #[test]
    fn test_single_replica_rotation_creates_before_retiring() {
        let s = status(vec![cluster("kscout-aaaa", Duration::hours(13))]);

        let plan = compute_plan_at(&spec(1, 42, 12), &s, now());

        assert_eq!(plan.create_clusters, 1);
        assert_eq!(plan.delete_names(), vec!["kscout-aaaa"]);
    }

    #[test]
    fn test_primary_bound_above_delete_bound() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(3)),
            cluster("kscout-bbbb", Duration::hours(1)),
        ]);

        let plan = compute_plan_at(&spec(2, 2, 10), &s, now());

        assert_eq!(plan.delete_names(), vec!["kscout-aaaa"]);
        assert_eq!(plan.create_clusters, 1);
        assert_eq!(plan.primary.as_deref(), Some("kscout-bbbb"));
    }

    #[test]
    fn test_future_creation_counts_as_new() {
        let s = status(vec![
            cluster("kscout-aaaa", Duration::hours(-2)),
            cluster("kscout-bbbb", Duration::hours(1)),
        ]);

        let plan = compute_plan_at(&spec(2, 42, 12), &s, now());
        assert!(plan.is_empty());
        assert_eq!(plan.primary.as_deref(), Some("kscout-aaaa"));
    }

    #[test]
    fn test_plan_does_not_mutate_status() {
        let s = status(vec![
            cluster("kscout-cccc", Duration::hours(1)),
            cluster("kscout-aaaa", Duration::hours(50)),
        ]);
        let before = s.clone();

        let _ = compute_plan_at(&spec(1, 42, 12), &s, now());
        assert_eq!(s, before);
    }

    #[test]
    fn test_display() {
        let s = status(vec![cluster("kscout-aaaa", Duration::hours(50))]);
        let plan = compute_plan_at(&spec(1, 42, 12), &s, now());
        let text = plan.to_string();
        assert!(text.contains("kscout-aaaa"));
        assert!(text.contains("create_clusters=1"));
    }

    fn arb_status() -> impl Strategy<Value = ArchetypeStatus> {
        proptest::collection::btree_map("[a-z0-9]{4}", 0i64..100 * 3600, 0..12).prop_map(|m| {
            status(
                m.into_iter()
                    .map(|(suffix, secs)| {
                        cluster(&format!("kscout-{}", suffix), Duration::seconds(secs))
                    })
                    .collect(),
            )
        })
    }

    fn arb_spec() -> impl Strategy<Value = ArchetypeSpec> {
        (0usize..8, 1u64..60, 1u64..60).prop_map(|(r, d, p)| spec(r, d, p))
    }

    proptest! {
        #[test]
        fn prop_plan_is_deterministic(spec in arb_spec(), s in arb_status()) {
            let a = compute_plan_at(&spec, &s, now());
            let b = compute_plan_at(&spec, &s, now());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_expired_clusters_always_deleted(spec in arb_spec(), s in arb_status()) {
            let plan = compute_plan_at(&spec, &s, now());
            let deleted: HashSet<String> = plan.delete_names().into_iter().collect();

            prop_assert_eq!(deleted.len(), plan.delete_clusters.len());
            for c in &s.clusters {
                if c.age(now()).to_std().unwrap_or_default() >= spec.delete_after() {
                    prop_assert!(deleted.contains(&c.name));
                }
            }
        }

        #[test]
        fn prop_plan_converges_to_replica_count(spec in arb_spec(), s in arb_status()) {
            let plan = compute_plan_at(&spec, &s, now());
            let after = s.len() + plan.create_clusters - plan.delete_clusters.len();
            prop_assert_eq!(after, spec.replica_count());
        }

        #[test]
        fn prop_steady_state_is_empty_plan(n in 0usize..8, ages in proptest::collection::vec(0i64..11 * 3600, 8)) {
            let s = status(
                (0..n)
                    .map(|i| cluster(&format!("kscout-{:04}", i), Duration::seconds(ages[i])))
                    .collect(),
            );
            let plan = compute_plan_at(&spec(n, 42, 12), &s, now());
            prop_assert!(plan.is_empty());
        }

        #[test]
        fn prop_replica_increase_adds_creations(
            n in 0usize..6,
            k in 0usize..6,
            ages in proptest::collection::vec(0i64..11 * 3600, 6),
        ) {
            let s = status(
                (0..n)
                    .map(|i| cluster(&format!("kscout-{:04}", i), Duration::seconds(ages[i])))
                    .collect(),
            );
            let base = compute_plan_at(&spec(n, 42, 12), &s, now());
            let scaled = compute_plan_at(&spec(n + k, 42, 12), &s, now());

            prop_assert!(scaled.delete_clusters.is_empty());
            prop_assert_eq!(scaled.create_clusters, base.create_clusters + k);
        }
    }
}
