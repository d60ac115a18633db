//! `acctl plan`: offline dry run of the planner
//!
//! Reads a controller configuration and an inventory snapshot and prints
//! what the controller would do, without contacting AWS or a controller.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use controller_lib::inventory::{parse_describe_instances, status_from_instances};
use controller_lib::{compute_plan_at, ArchetypePlan, ArchetypeStatus, ControllerSettings, Instance};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_age, print_info, print_rows, OutputFormat};

#[derive(Tabled)]
struct ClusterRow {
    #[tabled(rename = "Archetype")]
    archetype: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Action")]
    action: &'static str,
}

#[derive(Serialize)]
struct PlanReport {
    now: DateTime<Utc>,
    plans: Vec<ArchetypePlan>,
}

/// Load instances from either a plain `[{"name", "created_at"}]` array or
/// the output of `aws ec2 describe-instances`.
fn load_instances(path: &Path) -> Result<Vec<Instance>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {}", path.display()))?;

    if let Ok(instances) = serde_json::from_str::<Vec<Instance>>(&raw) {
        return Ok(instances);
    }
    let page = parse_describe_instances(&raw)
        .with_context(|| format!("Unrecognized inventory format in {}", path.display()))?;
    Ok(page.instances)
}

fn cluster_action(plan: &ArchetypePlan, name: &str) -> &'static str {
    if plan.delete_clusters.iter().any(|c| c.name == name) {
        "delete"
    } else if plan.primary.as_deref() == Some(name) {
        "primary"
    } else {
        "keep"
    }
}

pub fn show_plan(
    config: &Path,
    inventory: &Path,
    now: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> Result<()> {
    let yaml = std::fs::read_to_string(config)
        .with_context(|| format!("Failed to read config {}", config.display()))?;
    let settings = ControllerSettings::from_yaml(&yaml)?;
    let instances = load_instances(inventory)?;
    let now = now.unwrap_or_else(Utc::now);

    let mut rows = Vec::new();
    let mut plans = Vec::with_capacity(settings.archetypes.len());

    for spec in &settings.archetypes {
        let status: ArchetypeStatus = status_from_instances(&instances, spec);
        let plan = compute_plan_at(spec, &status, now);

        for cluster in status.sorted_by_age() {
            rows.push(ClusterRow {
                archetype: spec.name_prefix.clone(),
                cluster: cluster.name.clone(),
                age: format_age(cluster.age(now)),
                action: cluster_action(&plan, &cluster.name),
            });
        }
        plans.push(plan);
    }

    let report = PlanReport { now, plans };
    print_rows(&rows, &report, format)?;

    if format == OutputFormat::Table {
        for plan in &report.plans {
            if plan.create_clusters > 0 {
                print_info(&format!(
                    "{}: create {} cluster(s)",
                    plan.name_prefix, plan.create_clusters
                ));
            }
            if plan.replaces_primary {
                print_info(&format!(
                    "{}: primary rotation pending, a replacement will take over",
                    plan.name_prefix
                ));
            }
        }
    }

    Ok(())
}
