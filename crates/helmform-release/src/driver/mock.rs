//! Mock release driver for testing
//!
//! This driver keeps releases in memory, useful for unit tests without
//! requiring a Kubernetes cluster or the `helm` binary. Rendering produces a
//! single ConfigMap carrying the values, so manifests change exactly when
//! values do.

use async_trait::async_trait;
use chrono::Utc;
use helmform_core::{LoadedChart, Values};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::ReleaseDriver;
use crate::actions::{InstallOptions, RenderOptions, UninstallOptions, UpgradeOptions};
use crate::error::{ReleaseError, Result};
use crate::release::{Hook, Release, ReleaseInfo, ReleaseStatus};

/// In-memory release driver for testing
#[derive(Clone, Default)]
pub struct MockReleaseDriver {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// (namespace, name) -> revisions, oldest first
    releases: HashMap<(String, String), Vec<Release>>,
    counts: OperationCounts,
    fail_next_install: Option<String>,
    fail_next_upgrade: Option<String>,
    lint_errors: Vec<String>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub installs: usize,
    pub upgrades: usize,
    pub uninstalls: usize,
    pub renders: usize,
    pub lints: usize,
    pub dependency_updates: usize,
}

impl MockReleaseDriver {
    /// Create a new empty mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<Release>) -> Self {
        let driver = Self::new();
        {
            let mut state = driver.lock();
            for release in releases {
                state
                    .releases
                    .entry((release.namespace.clone(), release.name.clone()))
                    .or_default()
                    .push(release);
            }
        }
        driver
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.lock().counts.clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        self.lock().counts = OperationCounts::default();
    }

    /// Make the next install record a failed release and return an error
    pub fn fail_next_install_with(&self, message: impl Into<String>) {
        self.lock().fail_next_install = Some(message.into());
    }

    /// Make the next upgrade (dry-run or not) fail with a Helm error
    pub fn fail_next_upgrade_with(&self, message: impl Into<String>) {
        self.lock().fail_next_upgrade = Some(message.into());
    }

    /// Make every lint call fail with these messages
    pub fn set_lint_errors(&self, messages: Vec<String>) {
        self.lock().lint_errors = messages;
    }

    /// Latest revision of every release
    pub fn all_releases(&self) -> Vec<Release> {
        self.lock()
            .releases
            .values()
            .filter_map(|history| history.last().cloned())
            .collect()
    }

    /// Count releases (not revisions)
    pub fn release_count(&self) -> usize {
        self.lock().releases.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MockState {
    fn latest(&self, namespace: &str, name: &str) -> Option<&Release> {
        self.releases
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|history| history.last())
    }

    fn store(&mut self, release: Release) {
        self.releases
            .entry((release.namespace.clone(), release.name.clone()))
            .or_default()
            .push(release);
    }
}

/// Deterministic manifest for a chart and its values
fn render_manifest(name: &str, namespace: &str, chart: &LoadedChart, values: &Values) -> Result<String> {
    let config_map = serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": {
                "app.kubernetes.io/instance": name,
                "helm.sh/chart": format!("{}-{}", chart.name(), chart.version()),
            },
        },
        "data": {
            "values.yaml": values.to_yaml()?,
        },
    });

    Ok(format!(
        "---\n# Source: {}/templates/configmap.yaml\n{}",
        chart.name(),
        serde_yaml::to_string(&config_map)?
    ))
}

fn test_hook(name: &str, chart: &LoadedChart) -> Hook {
    Hook {
        name: format!("{}-test-connection", name),
        kind: "Pod".to_string(),
        path: format!("{}/templates/tests/test-connection.yaml", chart.name()),
        manifest: format!(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: {}-test-connection\n  annotations:\n    helm.sh/hook: test\n",
            name
        ),
        events: vec!["test".to_string()],
    }
}

fn build_release(
    name: &str,
    namespace: &str,
    chart: &LoadedChart,
    values: &Values,
    version: u32,
    status: ReleaseStatus,
) -> Result<Release> {
    let now = Utc::now();
    Ok(Release {
        name: name.to_string(),
        namespace: namespace.to_string(),
        version,
        info: ReleaseInfo {
            first_deployed: Some(now),
            last_deployed: Some(now),
            description: String::new(),
            status,
            notes: format!("{} is running {} {}", name, chart.name(), chart.version()),
        },
        chart: chart.metadata.clone().into(),
        config: values.clone(),
        manifest: render_manifest(name, namespace, chart, values)?,
        hooks: vec![test_hook(name, chart)],
    })
}

fn no_deployed_releases(name: &str) -> ReleaseError {
    ReleaseError::Helm(format!("UPGRADE FAILED: \"{}\" has no deployed releases", name))
}

#[async_trait]
impl ReleaseDriver for MockReleaseDriver {
    async fn get(&self, namespace: &str, name: &str) -> Result<Release> {
        let mut state = self.lock();
        state.counts.gets += 1;

        state
            .latest(namespace, name)
            .cloned()
            .ok_or_else(|| ReleaseError::not_found(name, namespace))
    }

    async fn install(&self, options: &InstallOptions) -> Result<Release> {
        let mut state = self.lock();
        state.counts.installs += 1;

        let previous = state.latest(&options.namespace, &options.name).cloned();
        if let Some(previous) = &previous {
            let reusable = previous.status() == ReleaseStatus::Uninstalled
                || (options.replace && previous.needs_replacement());
            if !reusable {
                return Err(ReleaseError::Helm(
                    "INSTALLATION FAILED: cannot re-use a name that is still in use".to_string(),
                ));
            }
        }
        let version = previous.map(|p| p.version + 1).unwrap_or(1);

        if options.dry_run.is_dry_run() {
            return build_release(
                &options.name,
                &options.namespace,
                &options.chart,
                &options.values,
                version,
                ReleaseStatus::PendingInstall,
            );
        }

        if let Some(message) = state.fail_next_install.take() {
            let mut release = build_release(
                &options.name,
                &options.namespace,
                &options.chart,
                &options.values,
                version,
                ReleaseStatus::Failed,
            )?;
            release.info.description = format!("Release \"{}\" failed: {}", options.name, message);
            state.store(release.clone());
            return Err(ReleaseError::ReleaseFailed {
                release: Box::new(release),
                message,
            });
        }

        let mut release = build_release(
            &options.name,
            &options.namespace,
            &options.chart,
            &options.values,
            version,
            ReleaseStatus::Deployed,
        )?;
        release.info.description = options
            .description
            .clone()
            .unwrap_or_else(|| "Install complete".to_string());
        state.store(release.clone());
        Ok(release)
    }

    async fn upgrade(&self, options: &UpgradeOptions) -> Result<Release> {
        let mut state = self.lock();
        state.counts.upgrades += 1;

        if let Some(message) = state.fail_next_upgrade.take() {
            return Err(ReleaseError::Helm(message));
        }

        let key = (options.namespace.clone(), options.name.clone());
        let history = state.releases.get(&key).cloned().unwrap_or_default();
        let Some(previous) = history.last() else {
            return Err(no_deployed_releases(&options.name));
        };
        if !history.iter().any(|r| r.status() == ReleaseStatus::Deployed) {
            return Err(no_deployed_releases(&options.name));
        }

        let values = if options.reuse_values && !options.reset_values {
            let mut merged = previous.config.clone();
            merged.merge(&options.values);
            merged
        } else {
            options.values.clone()
        };

        let status = if options.dry_run.is_dry_run() {
            ReleaseStatus::PendingUpgrade
        } else {
            ReleaseStatus::Deployed
        };
        let mut release = build_release(
            &options.name,
            &options.namespace,
            &options.chart,
            &values,
            previous.version + 1,
            status,
        )?;
        release.info.first_deployed = previous.info.first_deployed;
        release.info.description = options
            .description
            .clone()
            .unwrap_or_else(|| "Upgrade complete".to_string());

        if options.dry_run.is_dry_run() {
            return Ok(release);
        }

        if let Some(history) = state.releases.get_mut(&key) {
            for revision in history.iter_mut() {
                if revision.status() == ReleaseStatus::Deployed {
                    revision.info.status = ReleaseStatus::Superseded;
                }
            }
        }
        state.store(release.clone());
        Ok(release)
    }

    async fn uninstall(&self, options: &UninstallOptions) -> Result<()> {
        let mut state = self.lock();
        state.counts.uninstalls += 1;

        let key = (options.namespace.clone(), options.name.clone());
        if options.keep_history {
            let latest = state
                .releases
                .get_mut(&key)
                .and_then(|history| history.last_mut())
                .ok_or_else(|| ReleaseError::not_found(&options.name, &options.namespace))?;
            latest.info.status = ReleaseStatus::Uninstalled;
            return Ok(());
        }

        state
            .releases
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ReleaseError::not_found(&options.name, &options.namespace))
    }

    async fn render(&self, options: &RenderOptions) -> Result<Release> {
        self.lock().counts.renders += 1;

        let mut release = build_release(
            &options.name,
            &options.namespace,
            &options.chart,
            &options.values,
            1,
            ReleaseStatus::PendingInstall,
        )?;

        if options.include_crds && !options.skip_crds {
            let crds: String = options
                .chart
                .crds
                .iter()
                .map(|crd| format!("---\n# Source: {}/{}\n{}\n", options.chart.name(), crd.name, crd.as_str().trim()))
                .collect();
            release.manifest = format!("{}{}", crds, release.manifest);
        }
        if options.skip_tests {
            release.hooks.retain(|h| !h.is_test());
        }
        Ok(release)
    }

    async fn lint(&self, chart: &LoadedChart, _namespace: &str, _values: &Values) -> Result<()> {
        let mut state = self.lock();
        state.counts.lints += 1;

        if state.lint_errors.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError::LintFailed {
                chart: chart.name().to_string(),
                messages: state.lint_errors.clone(),
            })
        }
    }

    async fn dependency_update(&self, chart_path: &Path) -> Result<()> {
        self.lock().counts.dependency_updates += 1;

        if !chart_path.is_dir() {
            return Err(ReleaseError::Helm(format!(
                "{} is not a chart directory",
                chart_path.display()
            )));
        }

        // vendor a minimal chart for every missing dependency
        let chart = LoadedChart::load(chart_path)?;
        let missing = chart.missing_dependencies();
        for dependency in chart.metadata.dependencies.iter().filter(|d| missing.contains(&d.name)) {
            let version = semver::Version::parse(&dependency.version)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "0.1.0".to_string());
            let dir = chart_path.join("charts").join(&dependency.name);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(
                dir.join("Chart.yaml"),
                format!("apiVersion: v2\nname: {}\nversion: {}\n", dependency.name, version),
            )?;
        }
        Ok(())
    }
}
