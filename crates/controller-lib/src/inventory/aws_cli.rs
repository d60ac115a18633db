//! EC2 inventory via the AWS command line tool
//!
//! Runs `aws ec2 describe-instances` one page at a time and keeps only
//! pending or running instances that carry a `Name` tag.

use super::{InventoryPage, InventorySource};
use crate::error::InventoryError;
use crate::models::Instance;
use crate::settings::InventorySettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// EC2 state code for `running`. Lower codes (`pending`) are kept, higher
/// codes (shutting down, stopped, terminated) are skipped.
pub const RUNNING_STATE_CODE: i64 = 16;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    #[serde(default)]
    instance_id: Option<String>,
    launch_time: String,
    state: InstanceState,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

/// Parse one page of `aws ec2 describe-instances --output json`
pub fn parse_describe_instances(json: &str) -> Result<InventoryPage, InventoryError> {
    let output: DescribeInstancesOutput = serde_json::from_str(json)?;
    let mut instances = Vec::new();

    for instance in output.reservations.into_iter().flat_map(|r| r.instances) {
        // Only the low byte is the state, the high byte is provider internal
        if instance.state.code & 0xff > RUNNING_STATE_CODE {
            continue;
        }

        let Some(name) = instance
            .tags
            .iter()
            .find(|t| t.key == "Name")
            .map(|t| t.value.clone())
        else {
            continue;
        };

        let created_at = DateTime::parse_from_rfc3339(&instance.launch_time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| InventoryError::InvalidLaunchTime {
                instance: instance.instance_id.clone().unwrap_or_else(|| name.clone()),
                value: instance.launch_time.clone(),
            })?;

        instances.push(Instance { name, created_at });
    }

    Ok(InventoryPage {
        instances,
        next_token: output.next_token.filter(|t| !t.is_empty()),
    })
}

/// Inventory source backed by the `aws` executable
#[derive(Debug, Clone)]
pub struct AwsCliInventory {
    binary: PathBuf,
    region: Option<String>,
    page_size: usize,
}

impl AwsCliInventory {
    pub fn new(settings: &InventorySettings) -> Self {
        Self {
            binary: settings.aws_binary.clone(),
            region: settings.region.clone(),
            page_size: settings.page_size,
        }
    }

    fn args(&self, token: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "ec2".to_string(),
            "describe-instances".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--max-items".to_string(),
            self.page_size.to_string(),
        ];
        if let Some(token) = token {
            args.push("--starting-token".to_string());
            args.push(token.to_string());
        }
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args
    }
}

#[async_trait]
impl InventorySource for AwsCliInventory {
    async fn list_page(&self, token: Option<String>) -> Result<InventoryPage, InventoryError> {
        let args = self.args(token.as_deref());
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        debug!(command = %command, "Querying EC2 inventory");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| InventoryError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(InventoryError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_describe_instances(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"{
        "Reservations": [
            {
                "Instances": [
                    {
                        "InstanceId": "i-0001",
                        "LaunchTime": "2024-03-01T10:00:00+00:00",
                        "State": {"Code": 16, "Name": "running"},
                        "Tags": [
                            {"Key": "kubernetes.io/cluster/kscout-ab12-9kjcx", "Value": "owned"},
                            {"Key": "Name", "Value": "kscout-ab12-9kjcx-master-0"}
                        ]
                    },
                    {
                        "InstanceId": "i-0002",
                        "LaunchTime": "2024-03-01T09:00:00.000Z",
                        "State": {"Code": 0, "Name": "pending"},
                        "Tags": [{"Key": "Name", "Value": "kscout-ab12-9kjcx-worker-0"}]
                    }
                ]
            },
            {
                "Instances": [
                    {
                        "InstanceId": "i-0003",
                        "LaunchTime": "2024-03-01T08:00:00+00:00",
                        "State": {"Code": 48, "Name": "terminated"},
                        "Tags": [{"Key": "Name", "Value": "kscout-old1-xxxxx-master-0"}]
                    },
                    {
                        "InstanceId": "i-0004",
                        "LaunchTime": "2024-03-01T08:00:00+00:00",
                        "State": {"Code": 16, "Name": "running"}
                    }
                ]
            }
        ],
        "NextToken": "eyJOZXh0VG9rZW4iOiBudWxsfQ=="
    }"#;

    #[test]
    fn test_parse_filters_state_and_untagged() {
        let page = parse_describe_instances(PAGE).unwrap();

        assert_eq!(page.instances.len(), 2);
        assert_eq!(page.instances[0].name, "kscout-ab12-9kjcx-master-0");
        assert_eq!(
            page.instances[0].created_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(page.instances[1].name, "kscout-ab12-9kjcx-worker-0");
        assert_eq!(page.next_token.as_deref(), Some("eyJOZXh0VG9rZW4iOiBudWxsfQ=="));
    }

    #[test]
    fn test_parse_last_page() {
        let page = parse_describe_instances(r#"{"Reservations": []}"#).unwrap();
        assert!(page.instances.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_parse_invalid_launch_time() {
        let json = r#"{"Reservations": [{"Instances": [{
            "InstanceId": "i-bad",
            "LaunchTime": "yesterday",
            "State": {"Code": 16},
            "Tags": [{"Key": "Name", "Value": "kscout-ab12-master-0"}]
        }]}]}"#;

        match parse_describe_instances(json) {
            Err(InventoryError::InvalidLaunchTime { instance, value }) => {
                assert_eq!(instance, "i-bad");
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(matches!(
            parse_describe_instances("not json"),
            Err(InventoryError::Parse(_))
        ));
    }

    #[test]
    fn test_args_include_token_and_region() {
        let inventory = AwsCliInventory::new(&InventorySettings {
            aws_binary: PathBuf::from("aws"),
            region: Some("us-east-2".to_string()),
            page_size: 50,
        });

        let args = inventory.args(Some("tok"));
        assert!(args.windows(2).any(|w| w == ["--starting-token", "tok"]));
        assert!(args.windows(2).any(|w| w == ["--region", "us-east-2"]));
        assert!(args.windows(2).any(|w| w == ["--max-items", "50"]));

        let first = inventory.args(None);
        assert!(!first.iter().any(|a| a == "--starting-token"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_page_reports_command_failure() {
        let inventory = AwsCliInventory::new(&InventorySettings {
            aws_binary: PathBuf::from("false"),
            region: None,
            page_size: 10,
        });

        let result = inventory.list_page(None).await;
        assert!(matches!(result, Err(InventoryError::CommandFailed { .. })));
    }
}
