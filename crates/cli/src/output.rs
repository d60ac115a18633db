//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Print rows as a table, or the raw value as JSON
pub fn print_rows<T: Tabled, V: Serialize + ?Sized>(
    rows: &[T],
    raw: &V,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No items found".yellow());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(raw)?),
    }
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Compact age such as `3h12m` or `2d4h`
pub fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes().max(0);
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);

    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Color a health or outcome word
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ok" | "ready" => status.green().to_string(),
        "degraded" | "dry-run" => status.yellow().to_string(),
        "unhealthy" | "failed" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}
