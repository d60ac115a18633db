//! auto-cluster operator CLI
//!
//! Inspects a running controller and previews plans offline.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{health, plan, status};
use std::path::PathBuf;

/// auto-cluster operator CLI
#[derive(Parser)]
#[command(name = "acctl")]
#[command(author, version, about = "CLI for the auto-cluster fleet controller", long_about = None)]
pub struct Cli {
    /// Controller API URL (also ACCTL_API_URL, then ~/.config/acctl/config.json)
    #[arg(long, env = "ACCTL_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the last reconcile outcome per archetype
    Status {
        /// Only show this archetype
        #[arg(long, short)]
        archetype: Option<String>,
    },

    /// Show controller health and readiness
    Health,

    /// Preview plans from a config file and an inventory snapshot
    Plan {
        /// Controller configuration (YAML)
        #[arg(long, short)]
        config: PathBuf,

        /// Inventory snapshot: an instance array or describe-instances output
        #[arg(long, short)]
        inventory: PathBuf,

        /// Plan as of this RFC 3339 time instead of now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_client = || -> Result<client::ApiClient> {
        let url = config::Config::load()?.resolve_api_url(cli.api_url.as_deref());
        client::ApiClient::new(&url)
    };

    match &cli.command {
        Commands::Status { archetype } => {
            status::show_status(&api_client()?, archetype.clone(), cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&api_client()?, cli.format).await?;
        }
        Commands::Plan {
            config,
            inventory,
            now,
        } => {
            plan::show_plan(config, inventory, *now, cli.format)?;
        }
    }

    Ok(())
}
