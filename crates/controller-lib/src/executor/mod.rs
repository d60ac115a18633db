//! Plan execution
//!
//! Drives the external provisioning tool for every action of an
//! [`ArchetypePlan`]. Actions run one at a time, creations first, and a
//! failed action never stops the remaining ones. Each cluster owns the
//! subdirectory of the state root named after it:
//!
//! ```text
//! <state_dir>/<cluster>/install-config.yaml
//! <state_dir>/<cluster>/auth/kubeadmin-password
//! <state_dir>/<cluster>/auth/kubeconfig
//! ```

mod install_config;
mod names;
mod process;

#[cfg(test)]
pub(crate) mod tests;

pub use install_config::{InstallConfig, INSTALL_CONFIG_FILE};
pub use names::{NameGenerator, RandomSuffix, SuffixSource, DEFAULT_MAX_ATTEMPTS, SUFFIX_LEN};
pub use process::{run_logged, ToolContext, ToolOutput};

use crate::archetype::ArchetypeSpec;
use crate::error::ExecutionError;
use crate::models::{ArchetypeStatus, ClusterAccess};
use crate::notify::Notifier;
use crate::observability::StructuredLogger;
use crate::plan::ArchetypePlan;
use crate::settings::{ControllerSettings, InstallerSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

const AUTH_DIR: &str = "auth";
const KUBEADMIN_PASSWORD_FILE: &str = "kubeadmin-password";
const KUBECONFIG_FILE: &str = "kubeconfig";

/// Kind of external action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Delete,
    Install,
    Promote,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Install => "install",
            Action::Promote => "promote",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub action: Action,
    /// Cluster name, or the archetype prefix when no name could be generated
    pub cluster: String,
    pub error: String,
}

impl ActionFailure {
    pub fn new(action: Action, cluster: impl Into<String>, error: &ExecutionError) -> Self {
        Self {
            action,
            cluster: cluster.into(),
            error: error.to_string(),
        }
    }
}

/// Outcome of one execution pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    pub failures: Vec<ActionFailure>,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs plans against the provisioning tool
pub struct Executor {
    state_dir: PathBuf,
    installer: InstallerSettings,
    pull_secret: String,
    names: NameGenerator,
    notifier: Option<Arc<dyn Notifier>>,
    logger: StructuredLogger,
}

impl Executor {
    pub fn new(
        state_dir: impl Into<PathBuf>,
        installer: InstallerSettings,
        pull_secret: impl Into<String>,
    ) -> Self {
        Self {
            state_dir: state_dir.into(),
            installer,
            pull_secret: pull_secret.into(),
            names: NameGenerator::default(),
            notifier: None,
            logger: StructuredLogger::default(),
        }
    }

    pub fn from_settings(settings: &ControllerSettings) -> Self {
        Self::new(
            settings.state_dir.clone(),
            settings.installer.clone(),
            settings.pull_secret.clone(),
        )
    }

    pub fn with_names(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// State subdirectory owned by `cluster`
    pub fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.state_dir.join(cluster)
    }

    /// Execute `plan`, which must have been computed from `status`.
    ///
    /// Never fails as a whole; per-action failures are collected in the
    /// returned report.
    pub async fn execute(
        &self,
        spec: &ArchetypeSpec,
        status: &ArchetypeStatus,
        plan: &ArchetypePlan,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let mut known: HashSet<String> = status.cluster_names().into_iter().collect();

        for _ in 0..plan.create_clusters {
            let name = match self.names.generate(&spec.name_prefix, |candidate| {
                known.contains(candidate) || self.cluster_dir(candidate).exists()
            }) {
                Ok(name) => name,
                Err(e) => {
                    self.record_failure(&mut report, spec, Action::Create, &spec.name_prefix, &e);
                    continue;
                }
            };
            known.insert(name.clone());

            if let Err(e) = self.create_cluster(&name).await {
                self.record_failure(&mut report, spec, Action::Create, &name, &e);
                continue;
            }
            self.logger.log_cluster_created(&spec.name_prefix, &name);
            report.created.push(name.clone());

            if let Some(chart) = &spec.install.helm_chart {
                if let Err(e) = self.install_chart(spec, &name, chart).await {
                    self.record_failure(&mut report, spec, Action::Install, &name, &e);
                }
            }

            self.announce(spec, &name).await;
        }

        for cluster in &plan.delete_clusters {
            match self.destroy_cluster(&cluster.name).await {
                Ok(()) => {
                    self.logger.log_cluster_deleted(&spec.name_prefix, &cluster.name);
                    report.deleted.push(cluster.name.clone());
                }
                Err(e) => {
                    self.record_failure(&mut report, spec, Action::Delete, &cluster.name, &e);
                }
            }
        }

        info!(
            archetype = %spec.name_prefix,
            created = report.created.len(),
            deleted = report.deleted.len(),
            failures = report.failures.len(),
            "Execution pass finished"
        );
        report
    }

    /// Run the archetype's promotion hook for `cluster`.
    ///
    /// The hook receives `CLUSTER_NAME`, `CLUSTER_STATE_DIR` and
    /// `ARCHETYPE_PREFIX`. Without a configured hook this does nothing.
    pub async fn promote(&self, spec: &ArchetypeSpec, cluster: &str) -> Result<(), ExecutionError> {
        let Some((program, args)) = spec.promote.command.split_first() else {
            debug!(archetype = %spec.name_prefix, cluster = %cluster, "No promotion hook configured");
            return Ok(());
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .env("CLUSTER_NAME", cluster)
            .env("CLUSTER_STATE_DIR", self.cluster_dir(cluster))
            .env("ARCHETYPE_PREFIX", &spec.name_prefix);

        let ctx = ToolContext {
            tool: program.clone(),
            cluster: cluster.to_string(),
            action: Action::Promote.as_str(),
        };
        run_logged(command, &ctx, self.installer.timeout).await?;
        Ok(())
    }

    async fn create_cluster(&self, name: &str) -> Result<(), ExecutionError> {
        let dir = self.cluster_dir(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ExecutionError::Filesystem {
                path: dir.clone(),
                source,
            })?;

        let rendered = InstallConfig::new(name, &self.installer, &self.pull_secret).to_yaml()?;
        let config_path = dir.join(INSTALL_CONFIG_FILE);
        tokio::fs::write(&config_path, rendered)
            .await
            .map_err(|source| ExecutionError::Filesystem {
                path: config_path,
                source,
            })?;

        let mut command = Command::new(&self.installer.binary);
        command.arg("create").arg("cluster").arg("--dir").arg(&dir);

        info!(cluster = %name, dir = %dir.display(), "Creating cluster");
        run_logged(command, &self.installer_context(name, Action::Create), self.installer.timeout)
            .await?;
        Ok(())
    }

    async fn destroy_cluster(&self, name: &str) -> Result<(), ExecutionError> {
        let dir = self.cluster_dir(name);
        if !dir.is_dir() {
            return Err(ExecutionError::MissingState(name.to_string()));
        }

        let mut command = Command::new(&self.installer.binary);
        command.arg("destroy").arg("cluster").arg("--dir").arg(&dir);

        info!(cluster = %name, dir = %dir.display(), "Destroying cluster");
        run_logged(command, &self.installer_context(name, Action::Delete), self.installer.timeout)
            .await?;
        Ok(())
    }

    async fn install_chart(
        &self,
        spec: &ArchetypeSpec,
        name: &str,
        chart: &str,
    ) -> Result<(), ExecutionError> {
        let kubeconfig = self.cluster_dir(name).join(AUTH_DIR).join(KUBECONFIG_FILE);

        let mut command = Command::new(&self.installer.helm_binary);
        command
            .arg("upgrade")
            .arg("--install")
            .arg(spec.release_name())
            .arg(chart)
            .arg("--kubeconfig")
            .arg(&kubeconfig);

        let ctx = ToolContext {
            tool: self.installer.helm_binary.display().to_string(),
            cluster: name.to_string(),
            action: Action::Install.as_str(),
        };
        info!(cluster = %name, chart = %chart, "Installing chart");
        run_logged(command, &ctx, self.installer.timeout).await?;
        Ok(())
    }

    /// Read the credentials the installer left in the state directory
    pub async fn read_access(&self, name: &str) -> Result<ClusterAccess, ExecutionError> {
        let auth = self.cluster_dir(name).join(AUTH_DIR);

        let password_path = auth.join(KUBEADMIN_PASSWORD_FILE);
        let password = tokio::fs::read_to_string(&password_path)
            .await
            .map_err(|source| ExecutionError::Filesystem {
                path: password_path,
                source,
            })?;

        let kubeconfig = auth.join(KUBECONFIG_FILE);
        tokio::fs::metadata(&kubeconfig)
            .await
            .map_err(|source| ExecutionError::Filesystem {
                path: kubeconfig.clone(),
                source,
            })?;

        Ok(ClusterAccess {
            cluster_name: name.to_string(),
            kubeadmin_password: password.trim().to_string(),
            kubeconfig_path: kubeconfig.display().to_string(),
        })
    }

    async fn announce(&self, spec: &ArchetypeSpec, name: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let access = match self.read_access(name).await {
            Ok(access) => access,
            Err(e) => {
                warn!(cluster = %name, error = %e, "Cluster credentials unavailable, skipping notification");
                return;
            }
        };

        if let Err(e) = notifier.cluster_created(&spec.name_prefix, &access).await {
            warn!(cluster = %name, error = %e, "Failed to send cluster notification");
        }
    }

    fn installer_context(&self, name: &str, action: Action) -> ToolContext {
        ToolContext {
            tool: self.installer.binary.display().to_string(),
            cluster: name.to_string(),
            action: action.as_str(),
        }
    }

    fn record_failure(
        &self,
        report: &mut ExecutionReport,
        spec: &ArchetypeSpec,
        action: Action,
        cluster: &str,
        error: &ExecutionError,
    ) {
        let failure = ActionFailure::new(action, cluster, error);
        self.logger
            .log_action_failed(&spec.name_prefix, action.as_str(), cluster, &failure.error);
        report.failures.push(failure);
    }
}
