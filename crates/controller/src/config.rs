//! Command line arguments for the controller binary

use anyhow::{Context, Result};
use clap::Parser;
use controller_lib::settings::ControllerSettings;
use std::path::PathBuf;

/// Keeps a rotating fleet of clusters per archetype
#[derive(Debug, Parser)]
#[command(name = "auto-cluster")]
#[command(author, version, about, long_about = None)]
pub struct ControllerArgs {
    /// Configuration file (defaults to ./auto-cluster.yaml, then /etc/auto-cluster/config.yaml)
    #[arg(long, short, env = "AUTO_CLUSTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log plans without creating or deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Run a single reconcile cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl ControllerArgs {
    /// Load settings, with command line flags taking precedence
    pub fn load_settings(&self) -> Result<ControllerSettings> {
        let mut settings = ControllerSettings::load(self.config.as_deref())
            .context("Failed to load controller configuration")?;
        if self.dry_run {
            settings.dry_run = true;
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = ControllerArgs::parse_from([
            "auto-cluster",
            "--config",
            "/tmp/fleet.yaml",
            "--dry-run",
            "--once",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/fleet.yaml")));
        assert!(args.dry_run);
        assert!(args.once);
    }

    #[test]
    fn test_dry_run_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("pull-secret.json");
        std::fs::write(&secret, "{\"auths\":{}}\n").unwrap();
        let config = dir.path().join("fleet.yaml");
        std::fs::write(
            &config,
            format!(
                "archetypes:\n  - name_prefix: kscout\npull_secret_path: {}\nstate_dir: {}\ndry_run: false\n",
                secret.display(),
                dir.path().join("state").display()
            ),
        )
        .unwrap();

        let args = ControllerArgs::parse_from([
            "auto-cluster",
            "--config",
            config.to_str().unwrap(),
            "--dry-run",
        ]);
        let settings = args.load_settings().unwrap();
        assert!(settings.dry_run);
        assert_eq!(settings.pull_secret, "{\"auths\":{}}");
    }
}
