//! Installer configuration rendering
//!
//! Produces the `install-config.yaml` the provisioning tool reads from a
//! cluster's state directory.

use crate::settings::InstallerSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name expected by the installer inside the state directory
pub const INSTALL_CONFIG_FILE: &str = "install-config.yaml";

const CLUSTER_NETWORK_CIDR: &str = "10.128.0.0/14";
const CLUSTER_NETWORK_HOST_PREFIX: u8 = 23;
const MACHINE_CIDR: &str = "10.0.0.0/16";
const SERVICE_NETWORK_CIDR: &str = "172.30.0.0/16";
const NETWORK_TYPE: &str = "OpenShiftSDN";
const NODE_REPLICAS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    pub api_version: String,
    pub base_domain: String,
    pub compute: Vec<MachinePool>,
    pub control_plane: MachinePool,
    pub metadata: Metadata,
    pub networking: Networking,
    pub platform: Platform,
    pub pull_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachinePool {
    pub hyperthreading: String,
    pub name: String,
    pub platform: BTreeMap<String, String>,
    pub replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub creation_timestamp: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    pub cluster_network: Vec<ClusterNetwork>,
    #[serde(rename = "machineCIDR")]
    pub machine_cidr: String,
    pub network_type: String,
    pub service_network: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    pub cidr: String,
    pub host_prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub aws: AwsPlatform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsPlatform {
    pub region: String,
}

impl MachinePool {
    fn new(name: &str) -> Self {
        Self {
            hyperthreading: "Enabled".to_string(),
            name: name.to_string(),
            platform: BTreeMap::new(),
            replicas: NODE_REPLICAS,
        }
    }
}

impl InstallConfig {
    pub fn new(cluster_name: &str, installer: &InstallerSettings, pull_secret: &str) -> Self {
        Self {
            api_version: "v1".to_string(),
            base_domain: installer.base_domain.clone(),
            compute: vec![MachinePool::new("worker")],
            control_plane: MachinePool::new("master"),
            metadata: Metadata {
                creation_timestamp: None,
                name: cluster_name.to_string(),
            },
            networking: Networking {
                cluster_network: vec![ClusterNetwork {
                    cidr: CLUSTER_NETWORK_CIDR.to_string(),
                    host_prefix: CLUSTER_NETWORK_HOST_PREFIX,
                }],
                machine_cidr: MACHINE_CIDR.to_string(),
                network_type: NETWORK_TYPE.to_string(),
                service_network: vec![SERVICE_NETWORK_CIDR.to_string()],
            },
            platform: Platform {
                aws: AwsPlatform {
                    region: installer.region.clone(),
                },
            },
            pull_secret: pull_secret.to_string(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
