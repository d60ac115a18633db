//! Executor tests against a fake installer
//!
//! The fake is a shell script that records its arguments and mimics the
//! files the real installer leaves behind. Clusters whose name contains
//! `fail` cannot be created.

#[cfg(unix)]
pub(crate) mod fake_installer {
    use super::super::names::tests::ScriptedSuffix;
    use super::super::{Executor, NameGenerator};
    use crate::settings::InstallerSettings;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        _temp: TempDir,
        pub(crate) state_dir: PathBuf,
        pub(crate) log: PathBuf,
        pub(crate) installer: InstallerSettings,
    }

    pub(crate) fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let state_dir = temp.path().join("state");
        std::fs::create_dir_all(&state_dir).unwrap();
        let log = temp.path().join("calls.log");

        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{log}"
case "$1" in
  create)
    case "$4" in
      *fail*) echo "level=fatal msg=quota exceeded" >&2; exit 1 ;;
    esac
    mkdir -p "$4/auth"
    printf 'hunter2\n' > "$4/auth/kubeadmin-password"
    printf 'apiVersion: v1\n' > "$4/auth/kubeconfig"
    echo "Install complete!"
    ;;
  destroy)
    echo "Uninstallation complete!"
    ;;
esac
exit 0
"#,
            log = log.display()
        );
        let tool = temp.path().join("fake-tool");
        std::fs::write(&tool, script).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let installer = InstallerSettings {
            binary: tool.clone(),
            helm_binary: tool,
            timeout: Some(Duration::from_secs(30)),
            ..InstallerSettings::default()
        };

        Fixture {
            _temp: temp,
            state_dir,
            log,
            installer,
        }
    }

    /// Executor over the fake installer with a fixed suffix sequence
    pub(crate) fn scripted_executor(fx: &Fixture, suffixes: &[&str]) -> Executor {
        Executor::new(fx.state_dir.clone(), fx.installer.clone(), "{\"auths\":{}}")
            .with_names(NameGenerator::new(Box::new(ScriptedSuffix::new(suffixes))))
    }

    /// Argument lines the fake installer has recorded so far
    pub(crate) fn calls(fx: &Fixture) -> Vec<String> {
        std::fs::read_to_string(&fx.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

#[cfg(unix)]
mod executor_tests {
    use super::fake_installer::{calls, fixture, scripted_executor as executor};
    use super::super::*;
    use crate::models::ClusterStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    fn cluster(name: &str) -> ClusterStatus {
        ClusterStatus {
            name: name.to_string(),
            created_on: Utc::now(),
            instances: vec![],
        }
    }

    fn create_plan(count: usize) -> ArchetypePlan {
        ArchetypePlan {
            name_prefix: "kscout".to_string(),
            create_clusters: count,
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(String, ClusterAccess)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn cluster_created(&self, archetype: &str, access: &ClusterAccess) -> anyhow::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push((archetype.to_string(), access.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_writes_config_and_runs_installer() {
        let fx = fixture();
        let executor = executor(&fx, &["aaaa", "bbbb"]);
        let spec = ArchetypeSpec::new("kscout");

        let report = executor
            .execute(&spec, &ArchetypeStatus::default(), &create_plan(2))
            .await;

        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.created, vec!["kscout-aaaa", "kscout-bbbb"]);

        let config =
            std::fs::read_to_string(fx.state_dir.join("kscout-aaaa").join(INSTALL_CONFIG_FILE))
                .unwrap();
        assert!(config.contains("name: kscout-aaaa"));

        let calls = calls(&fx);
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("create cluster --dir "));
        assert!(calls[0].ends_with("kscout-aaaa"));
    }

    #[tokio::test]
    async fn test_names_avoid_known_clusters_and_state_dirs() {
        let fx = fixture();
        std::fs::create_dir_all(fx.state_dir.join("kscout-bbbb")).unwrap();
        let executor = executor(&fx, &["aaaa", "bbbb", "cccc"]);
        let status = ArchetypeStatus {
            clusters: vec![cluster("kscout-aaaa")],
        };

        let report = executor
            .execute(&ArchetypeSpec::new("kscout"), &status, &create_plan(1))
            .await;

        assert_eq!(report.created, vec!["kscout-cccc"]);
    }

    #[tokio::test]
    async fn test_names_unique_within_one_pass() {
        let fx = fixture();
        let executor = executor(&fx, &["aaaa", "aaaa", "bbbb"]);

        let report = executor
            .execute(
                &ArchetypeSpec::new("kscout"),
                &ArchetypeStatus::default(),
                &create_plan(2),
            )
            .await;

        assert_eq!(report.created, vec!["kscout-aaaa", "kscout-bbbb"]);
    }

    #[tokio::test]
    async fn test_failed_create_does_not_stop_others() {
        let fx = fixture();
        let executor = executor(&fx, &["fail", "good"]);

        let report = executor
            .execute(
                &ArchetypeSpec::new("kscout"),
                &ArchetypeStatus::default(),
                &create_plan(2),
            )
            .await;

        assert_eq!(report.created, vec!["kscout-good"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].action, Action::Create);
        assert_eq!(report.failures[0].cluster, "kscout-fail");
    }

    #[tokio::test]
    async fn test_delete_missing_state_is_isolated() {
        let fx = fixture();
        std::fs::create_dir_all(fx.state_dir.join("kscout-old1")).unwrap();
        let executor = executor(&fx, &["aaaa"]);
        let status = ArchetypeStatus {
            clusters: vec![cluster("kscout-gone"), cluster("kscout-old1")],
        };
        let plan = ArchetypePlan {
            name_prefix: "kscout".to_string(),
            delete_clusters: status.clusters.clone(),
            ..Default::default()
        };

        let report = executor
            .execute(&ArchetypeSpec::new("kscout"), &status, &plan)
            .await;

        assert_eq!(report.deleted, vec!["kscout-old1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].action, Action::Delete);
        assert_eq!(report.failures[0].cluster, "kscout-gone");
        assert!(report.failures[0].error.contains("no state directory"));

        let calls = calls(&fx);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("destroy cluster --dir "));
    }

    #[tokio::test]
    async fn test_creates_run_before_deletes() {
        let fx = fixture();
        std::fs::create_dir_all(fx.state_dir.join("kscout-old1")).unwrap();
        let executor = executor(&fx, &["new1"]);
        let status = ArchetypeStatus {
            clusters: vec![cluster("kscout-old1")],
        };
        let plan = ArchetypePlan {
            name_prefix: "kscout".to_string(),
            delete_clusters: status.clusters.clone(),
            create_clusters: 1,
            ..Default::default()
        };

        let report = executor
            .execute(&ArchetypeSpec::new("kscout"), &status, &plan)
            .await;
        assert!(report.is_success());

        let calls = calls(&fx);
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("create"));
        assert!(calls[1].starts_with("destroy"));
    }

    #[tokio::test]
    async fn test_chart_installed_only_on_new_clusters() {
        let fx = fixture();
        let executor = executor(&fx, &["new1"]);
        let spec = ArchetypeSpec::new("kscout").with_helm_chart("kscout/serverless");
        let status = ArchetypeStatus {
            clusters: vec![cluster("kscout-old1")],
        };

        let report = executor.execute(&spec, &status, &create_plan(1)).await;
        assert!(report.is_success(), "{:?}", report.failures);

        let installs: Vec<String> = calls(&fx)
            .into_iter()
            .filter(|c| c.starts_with("upgrade"))
            .collect();
        assert_eq!(installs.len(), 1);
        assert!(installs[0].starts_with("upgrade --install kscout kscout/serverless --kubeconfig "));
        assert!(installs[0].ends_with("kscout-new1/auth/kubeconfig"));
    }

    #[tokio::test]
    async fn test_notifier_receives_trimmed_credentials() {
        let fx = fixture();
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = executor(&fx, &["ab12"]).with_notifier(notifier.clone());

        executor
            .execute(
                &ArchetypeSpec::new("kscout"),
                &ArchetypeStatus::default(),
                &create_plan(1),
            )
            .await;

        let seen = notifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "kscout");
        assert_eq!(seen[0].1.cluster_name, "kscout-ab12");
        assert_eq!(seen[0].1.kubeadmin_password, "hunter2");
        assert!(seen[0].1.kubeconfig_path.ends_with("kscout-ab12/auth/kubeconfig"));
    }

    #[tokio::test]
    async fn test_promote_passes_cluster_environment() {
        let fx = fixture();
        let out = fx.state_dir.join("promoted");
        let executor = executor(&fx, &["aaaa"]);
        let spec = ArchetypeSpec::new("kscout").with_promote_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!(
                "echo \"$CLUSTER_NAME $ARCHETYPE_PREFIX $CLUSTER_STATE_DIR\" > {}",
                out.display()
            ),
        ]);

        executor.promote(&spec, "kscout-ab12").await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert!(written.starts_with("kscout-ab12 kscout "));
        assert!(written.trim_end().ends_with("kscout-ab12"));
    }

    #[tokio::test]
    async fn test_promote_without_hook_is_noop() {
        let fx = fixture();
        let executor = executor(&fx, &["aaaa"]);

        executor
            .promote(&ArchetypeSpec::new("kscout"), "kscout-ab12")
            .await
            .unwrap();
        assert!(calls(&fx).is_empty());
    }
}
