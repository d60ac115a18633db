//! Controller configuration
//!
//! Loaded once at startup from a YAML file plus `AUTO_CLUSTER__*`
//! environment overrides. Validation failures are fatal before the first
//! reconcile cycle runs.

use crate::archetype::ArchetypeSpec;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config files searched when no explicit path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["./auto-cluster.yaml", "/etc/auto-cluster/config.yaml"];

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "AUTO_CLUSTER";

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Top level controller configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Archetypes of clusters to maintain
    pub archetypes: Vec<ArchetypeSpec>,

    /// File holding the registry pull secret used by the installer
    pub pull_secret_path: PathBuf,

    /// Directory holding per-cluster installer state. Must persist across
    /// restarts or existing clusters cannot be destroyed.
    pub state_dir: PathBuf,

    #[serde(default = "default_reconcile_interval", with = "duration_format")]
    pub reconcile_interval: Duration,

    /// Terminate the process when a cycle fails instead of retrying next tick
    #[serde(default)]
    pub exit_on_cycle_failure: bool,

    /// Log plans without executing them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub installer: InstallerSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Contents of `pull_secret_path`, read during `load`
    #[serde(skip)]
    pub pull_secret: String,
}

/// External provisioning tool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerSettings {
    #[serde(default = "default_installer_binary")]
    pub binary: PathBuf,

    /// Upper bound for a single tool invocation. Unset waits indefinitely.
    #[serde(default, with = "duration_format::option")]
    pub timeout: Option<Duration>,

    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_helm_binary")]
    pub helm_binary: PathBuf,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            binary: default_installer_binary(),
            timeout: None,
            base_domain: default_base_domain(),
            region: default_region(),
            helm_binary: default_helm_binary(),
        }
    }
}

/// Cloud inventory query settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default = "default_aws_binary")]
    pub aws_binary: PathBuf,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            aws_binary: default_aws_binary(),
            region: None,
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Chat webhook announcing new clusters
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_reconcile_interval() -> Duration {
    DEFAULT_RECONCILE_INTERVAL
}

fn default_api_port() -> u16 {
    8080
}

fn default_installer_binary() -> PathBuf {
    PathBuf::from("openshift-install")
}

fn default_base_domain() -> String {
    "devcluster.openshift.com".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_helm_binary() -> PathBuf {
    PathBuf::from("helm")
}

fn default_aws_binary() -> PathBuf {
    PathBuf::from("aws")
}

fn default_page_size() -> usize {
    100
}

impl ControllerSettings {
    /// Load configuration from `path`, or the first default path that exists
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "no configuration file found in {}",
                        DEFAULT_CONFIG_PATHS.join(", ")
                    ))
                })?,
        };

        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: ControllerSettings = raw.try_deserialize()?;
        settings.validate()?;
        settings.read_pull_secret()?;

        Ok(settings)
    }

    /// Parse settings from a YAML document without reading the pull secret
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;
        let settings: ControllerSettings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check structural requirements
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.archetypes.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one archetype is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for archetype in &self.archetypes {
            archetype.validate()?;
            if !seen.insert(archetype.name_prefix.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate archetype name_prefix {}",
                    archetype.name_prefix
                )));
            }
        }

        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("state_dir is required".to_string()));
        }
        if self.pull_secret_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "pull_secret_path is required".to_string(),
            ));
        }
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reconcile_interval must be greater than zero".to_string(),
            ));
        }
        if self.inventory.page_size == 0 {
            return Err(ConfigError::Invalid(
                "inventory.page_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn read_pull_secret(&mut self) -> Result<(), ConfigError> {
        let secret = std::fs::read_to_string(&self.pull_secret_path).map_err(|source| {
            ConfigError::PullSecret {
                path: self.pull_secret_path.clone(),
                source,
            }
        })?;
        self.pull_secret = secret.trim().to_string();
        Ok(())
    }
}

impl std::fmt::Debug for ControllerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pull_secret = if self.pull_secret.is_empty() {
            ""
        } else {
            "REDACTED_NOT_EMPTY"
        };

        f.debug_struct("ControllerSettings")
            .field("archetypes", &self.archetypes)
            .field("pull_secret_path", &self.pull_secret_path)
            .field("state_dir", &self.state_dir)
            .field("reconcile_interval", &self.reconcile_interval)
            .field("exit_on_cycle_failure", &self.exit_on_cycle_failure)
            .field("dry_run", &self.dry_run)
            .field("api_port", &self.api_port)
            .field("installer", &self.installer)
            .field("inventory", &self.inventory)
            .field("notifications", &self.notifications)
            .field("pull_secret", &pull_secret)
            .finish()
    }
}

/// Parse durations such as `42h`, `1h30m`, `2d`, `90s` or a bare number of seconds
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return Err(format!("invalid duration unit {:?} in {:?}", ch, input)),
        };
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before {:?} in {:?}", ch, input))?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("duration {:?} overflows", input))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("trailing number without unit in {:?}", input));
    }

    Ok(Duration::from_secs(total))
}

/// Format a duration in the shape accepted by `parse_duration`
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}

/// Serde adapter for human readable durations
pub mod duration_format {
    use super::{format_duration, parse_duration};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration such as \"42h\" or a number of seconds")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_duration(v).map_err(E::custom)
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            let value: Option<Wrapper> = Option::deserialize(deserializer)?;
            Ok(value.map(|Wrapper(d)| d))
        }
    }
}
