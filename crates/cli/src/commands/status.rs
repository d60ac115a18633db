//! `acctl status`: last reconcile outcome per archetype

use anyhow::Result;
use colored::Colorize;
use controller_lib::reconcile::{CycleReport, StatusSnapshot};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_info, print_rows, print_warning, OutputFormat};

#[derive(Tabled)]
struct ArchetypeRow {
    #[tabled(rename = "Archetype")]
    archetype: String,
    #[tabled(rename = "Observed")]
    observed: usize,
    #[tabled(rename = "Create")]
    create: usize,
    #[tabled(rename = "Delete")]
    delete: usize,
    #[tabled(rename = "Primary")]
    primary: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Finished")]
    finished: String,
}

impl From<&CycleReport> for ArchetypeRow {
    fn from(report: &CycleReport) -> Self {
        let (create, delete) = report
            .plan
            .as_ref()
            .map(|p| (p.create_clusters, p.delete_clusters.len()))
            .unwrap_or_default();

        Self {
            archetype: report.name_prefix.clone(),
            observed: report.observed_clusters.len(),
            create,
            delete,
            primary: report.primary.clone().unwrap_or_else(|| "-".to_string()),
            result: color_status(outcome(report)),
            finished: format_timestamp(report.finished_at),
        }
    }
}

fn outcome(report: &CycleReport) -> &'static str {
    if !report.is_success() {
        "failed"
    } else if report.dry_run {
        "dry-run"
    } else {
        "ok"
    }
}

pub async fn show_status(
    client: &ApiClient,
    archetype: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut snapshot: StatusSnapshot = client.get("api/v1/status").await?;
    if let Some(prefix) = &archetype {
        snapshot.archetypes.retain(|name, _| name == prefix);
    }

    let rows: Vec<ArchetypeRow> = snapshot.archetypes.values().map(ArchetypeRow::from).collect();

    if format == OutputFormat::Table {
        println!("{}", "Controller Status".bold());
        println!("{}", "=".repeat(60));
        println!(
            "Cycles:        {} completed, {} failed",
            snapshot.cycles_completed, snapshot.cycles_failed
        );
        println!(
            "Last cycle:    {}",
            format_timestamp(snapshot.last_cycle_finished_at)
        );
        if snapshot.dry_run {
            print_info("Controller is running in dry-run mode");
        }
        println!();
    }

    print_rows(&rows, &snapshot, format)?;

    if format == OutputFormat::Table {
        for report in snapshot.archetypes.values() {
            if let Some(error) = &report.error {
                print_warning(&format!("{}: {}", report.name_prefix, error));
            }
            let failures = report.execution.iter().flat_map(|e| e.failures.iter());
            for failure in failures {
                println!(
                    "    {} {} {}: {}",
                    "-".dimmed(),
                    failure.action,
                    failure.cluster.cyan(),
                    failure.error
                );
            }
        }
    }

    Ok(())
}
