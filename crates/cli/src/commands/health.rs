//! `acctl health`: liveness and readiness of a running controller

use anyhow::Result;
use colored::Colorize;
use controller_lib::health::{ComponentStatus, HealthResponse, ReadinessResponse};
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_rows, print_success, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

#[derive(Serialize)]
struct HealthReport<'a> {
    health: &'a HealthResponse,
    readiness: &'a ReadinessResponse,
}

fn status_word(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get_probe_json("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_probe_json("readyz").await?;

    let rows: Vec<ComponentRow> = health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            component: name.clone(),
            status: color_status(status_word(component.status)),
            message: component.message.clone().unwrap_or_default(),
            updated: component.updated_at.format("%H:%M:%S").to_string(),
        })
        .collect();

    if format == OutputFormat::Table {
        println!(
            "{} {}",
            "Overall:".bold(),
            color_status(status_word(health.status))
        );
    }

    print_rows(
        &rows,
        &HealthReport {
            health: &health,
            readiness: &readiness,
        },
        format,
    )?;

    if format == OutputFormat::Table {
        if readiness.ready {
            print_success("Controller is ready");
        } else {
            print_warning(&format!(
                "Controller is not ready: {}",
                readiness.reason.as_deref().unwrap_or("unknown reason")
            ));
        }
    }

    Ok(())
}
