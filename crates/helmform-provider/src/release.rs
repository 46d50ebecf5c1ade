//! The `helm_release` resource
//!
//! Each operation runs to completion against the configured release driver.
//! Chart resolution goes through the shared [`ChartResolver`], which
//! serializes resolve-and-load across concurrently planned resources.
//!
//! [`ChartResolver`]: helmform_repo::ChartResolver

use helmform_core::{LoadedChart, cloak};
use helmform_release::{
    DriftRenderer, DryRun, PlanRequest, Release, ReleaseError, ReleasePlan, normalize,
};
use helmform_repo::ResolvedChart;

use crate::error::{Applied, Diagnostic, ProviderError, Result};
use crate::meta::Meta;
use crate::schema::{ReleaseConfig, ReleaseMetadata, ReleaseState};

/// Resolve and load a chart, without any installability checks
pub(crate) async fn resolve_chart(meta: &Meta, config: &ReleaseConfig) -> Result<ResolvedChart> {
    let resolved = meta
        .resolver()
        .load(&config.chart_reference(), &config.resolve_options())
        .await?;
    if resolved.chart.metadata.deprecated {
        tracing::warn!("{} This chart is deprecated", config.log_id());
    }
    Ok(resolved)
}

/// Resolve a chart and make sure it can be installed as configured.
///
/// Missing dependencies are vendored once when `dependency_update` is set,
/// then checked again.
pub(crate) async fn load_chart(meta: &Meta, config: &ReleaseConfig) -> Result<LoadedChart> {
    let log_id = config.log_id();
    let resolved = resolve_chart(meta, config).await?;
    resolved.chart.check_installable()?;

    let missing = resolved.chart.missing_dependencies();
    if missing.is_empty() {
        return Ok(resolved.chart);
    }
    if !config.dependency_update {
        return Err(dependency_check_failed(&resolved.chart, missing));
    }

    tracing::info!("{} Updating chart dependencies: {}", log_id, missing.join(", "));
    meta.driver().dependency_update(&resolved.path).await?;

    let reloaded = meta.resolver().reload(&resolved.path).await?;
    let missing = reloaded.chart.missing_dependencies();
    if !missing.is_empty() {
        return Err(dependency_check_failed(&reloaded.chart, missing));
    }
    Ok(reloaded.chart)
}

fn dependency_check_failed(chart: &LoadedChart, missing: Vec<String>) -> ProviderError {
    ReleaseError::DependencyCheckFailed {
        chart: chart.name().to_string(),
        missing,
    }
    .into()
}

/// Split an import identifier of the form `namespace/name`
pub fn parse_import_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((namespace, name))
        }
        _ => Err(ProviderError::InvalidImportId { id: id.to_string() }),
    }
}

/// Operations of the `helm_release` resource
pub struct ReleaseResource<'a> {
    meta: &'a Meta,
}

impl<'a> ReleaseResource<'a> {
    pub fn new(meta: &'a Meta) -> Self {
        Self { meta }
    }

    /// Predict the computed attributes of an apply
    pub async fn plan(&self, prior: Option<&ReleaseState>, config: &ReleaseConfig) -> Result<ReleasePlan> {
        let log_id = config.log_id();
        config.validate()?;
        let sources = config.value_sources();
        let merged = sources.merge()?;
        let mut inputs_changed = prior.is_none_or(|p| config.inputs_changed(&p.config));

        let dry_run = match resolve_chart(self.meta, config).await {
            Ok(resolved) => {
                // a local chart can change version without any input changing
                if prior.is_some_and(|p| p.version != resolved.chart.version()) {
                    inputs_changed = true;
                }
                let values = merged.into_values();
                Some(match prior {
                    Some(_) => DryRun::Upgrade(config.upgrade_options(resolved.chart, values)),
                    None => DryRun::Install(config.install_options(resolved.chart, values)),
                })
            }
            Err(e) => {
                tracing::debug!("{} Could not load chart for plan: {}", log_id, e);
                None
            }
        };

        let request = PlanRequest {
            dry_run,
            inputs_changed,
            manifest_enabled: self.meta.manifest_enabled(),
            sensitive_literals: sources.sensitive_literals().into_iter().map(String::from).collect(),
        };
        Ok(DriftRenderer::new(self.meta.driver()).plan(request).await?)
    }

    pub async fn create(&self, config: &ReleaseConfig) -> Result<Applied<ReleaseState>> {
        let log_id = config.log_id();
        config.validate()?;
        tracing::info!("{} Creating release", log_id);

        let chart = load_chart(self.meta, config).await?;
        let merged = config.value_sources().merge()?;
        tracing::debug!("{} Values: {}", log_id, merged.cloaked_json()?);

        if config.lint {
            self.meta.driver().lint(&chart, &config.namespace, merged.values()).await?;
        }
        if config.disable_crd_hooks {
            tracing::warn!("{} disable_crd_hooks is not supported by the helm driver, ignoring", log_id);
        }

        self.remove_failed_release(config).await?;

        let options = config.install_options(chart, merged.into_values());
        match self.meta.driver().install(&options).await {
            Ok(release) => {
                tracing::info!("{} Release installed, revision {}", log_id, release.version);
                Ok(Applied::clean(self.release_state(config, &release)?))
            }
            Err(ReleaseError::ReleaseFailed { release, message }) => {
                tracing::warn!("{} Release was created but returned an error: {}", log_id, message);
                let state = self.release_state(config, &release)?;
                let warning = Diagnostic::warning(format!(
                    "Helm release {:?} was created but has a failed status. Use the `helm` command to investigate the error, correct it, then run Terraform again.",
                    config.name
                ))
                .with_detail(message);
                Ok(Applied {
                    state,
                    diagnostics: vec![warning],
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh the state; `None` when the release is gone
    pub async fn read(&self, state: &ReleaseState) -> Result<Option<ReleaseState>> {
        let config = &state.config;
        match self.meta.driver().get(&config.namespace, &config.name).await {
            Ok(release) => Ok(Some(self.release_state(config, &release)?)),
            Err(e) if e.is_not_found() => {
                tracing::info!("{} Release not found, removing from state", config.log_id());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update(&self, prior: &ReleaseState, config: &ReleaseConfig) -> Result<Applied<ReleaseState>> {
        let log_id = config.log_id();
        config.validate()?;

        if prior.config.name != config.name || prior.config.namespace != config.namespace {
            tracing::info!("{} Name or namespace changed, replacing {}", log_id, prior.log_id());
            self.delete(prior).await?;
            return self.create(config).await;
        }

        tracing::info!("{} Upgrading release", log_id);
        let chart = load_chart(self.meta, config).await?;
        let merged = config.value_sources().merge()?;
        tracing::debug!("{} Values: {}", log_id, merged.cloaked_json()?);

        if config.lint {
            self.meta.driver().lint(&chart, &config.namespace, merged.values()).await?;
        }

        let options = config.upgrade_options(chart, merged.into_values());
        match self.meta.driver().upgrade(&options).await {
            Ok(release) => {
                tracing::info!("{} Release upgraded, revision {}", log_id, release.version);
                Ok(Applied::clean(self.release_state(config, &release)?))
            }
            Err(ReleaseError::ReleaseFailed { release, message }) => {
                tracing::warn!("{} Release was upgraded but returned an error: {}", log_id, message);
                let state = self.release_state(config, &release)?;
                let warning = Diagnostic::warning(format!(
                    "Helm release {:?} was upgraded but has a failed status. Use the `helm` command to investigate the error, correct it, then run Terraform again.",
                    config.name
                ))
                .with_detail(message);
                Ok(Applied {
                    state,
                    diagnostics: vec![warning],
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Uninstall; a release that is already gone is not an error
    pub async fn delete(&self, state: &ReleaseState) -> Result<()> {
        let config = &state.config;
        let log_id = config.log_id();
        tracing::info!("{} Uninstalling release", log_id);

        match self.meta.driver().uninstall(&config.uninstall_options()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!("{} Release already uninstalled", log_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, state: &ReleaseState) -> Result<bool> {
        let config = &state.config;
        Ok(self.meta.driver().exists(&config.namespace, &config.name).await?)
    }

    /// Adopt an existing release from a `namespace/name` identifier
    pub async fn import(&self, id: &str) -> Result<ReleaseState> {
        let (namespace, name) = parse_import_id(id)?;
        let release = self.meta.driver().get(namespace, name).await?;

        let mut config = ReleaseConfig::new(name, release.chart_name()).with_namespace(namespace);
        config.version = release.chart_version().to_string();
        if !release.info.description.is_empty() {
            config.description = Some(release.info.description.clone());
        }
        if !release.config.is_empty() {
            config.values = vec![release.config.to_yaml()?];
        }

        tracing::info!("{} Imported release, revision {}", config.log_id(), release.version);
        self.release_state(&config, &release)
    }

    fn release_state(&self, config: &ReleaseConfig, release: &Release) -> Result<ReleaseState> {
        let sensitive_paths: Vec<&str> = config.set_sensitive.iter().map(|o| o.name.as_str()).collect();
        let values = cloak(&release.config, &sensitive_paths).to_json()?;

        let manifest = if self.meta.manifest_enabled() {
            let literals: Vec<&str> = config.set_sensitive.iter().map(|o| o.value.as_str()).collect();
            Some(normalize(&release.manifest, &literals)?)
        } else {
            None
        };

        Ok(ReleaseState {
            id: release.name.clone(),
            config: config.clone(),
            status: release.status().to_string(),
            version: release.chart_version().to_string(),
            metadata: Some(ReleaseMetadata::from_release(release, values)),
            manifest,
        })
    }

    async fn remove_failed_release(&self, config: &ReleaseConfig) -> Result<()> {
        let driver = self.meta.driver();
        match driver.get(&config.namespace, &config.name).await {
            Ok(existing) if existing.needs_replacement() => {
                tracing::warn!(
                    "{} Release exists with status {}, uninstalling it before install",
                    config.log_id(),
                    existing.status()
                );
                driver.uninstall(&config.uninstall_options()).await?;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use helmform_core::{SENSITIVE_VALUE, ValueOverride};
    use helmform_release::{MockReleaseDriver, Planned, ReleaseStatus};
    use helmform_repo::{ChartResolver, RemoteFetcher, ResolverSettings};
    use std::sync::Arc;
    use tempfile::TempDir;

    pub(crate) fn write_chart(dir: &std::path::Path, extra: &str) {
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(
            dir.join("Chart.yaml"),
            format!("apiVersion: v2\nname: web\nversion: 1.2.0\nappVersion: \"2.0\"\n{}", extra),
        )
        .unwrap();
        std::fs::write(dir.join("values.yaml"), "replicaCount: 1\n").unwrap();
        std::fs::write(dir.join("templates/configmap.yaml"), "kind: ConfigMap\n").unwrap();
    }

    pub(crate) fn meta(temp: &TempDir, driver: &MockReleaseDriver, manifest: bool) -> Meta {
        let resolver = ChartResolver::new(
            ResolverSettings::new(temp.path().join("repositories.yaml"), temp.path().join("cache")),
            Arc::new(RemoteFetcher::default()),
        );
        let mut config = ProviderConfig::default();
        config.experiments.manifest = manifest;
        Meta::new(config, resolver, Arc::new(driver.clone()))
    }

    fn release_config(temp: &TempDir) -> ReleaseConfig {
        let chart = temp.path().join("chart");
        write_chart(&chart, "");
        let mut config = ReleaseConfig::new("web", chart.to_string_lossy());
        config.values = vec!["replicaCount: 2\n".to_string()];
        config
    }

    #[tokio::test]
    async fn test_create_records_cloaked_values() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let mut config = release_config(&temp);
        config.set_sensitive = vec![ValueOverride::new("auth.password", "hunter2")];

        let applied = ReleaseResource::new(&meta).create(&config).await.unwrap();
        assert!(applied.diagnostics.is_empty());

        let state = applied.state;
        assert_eq!(state.id, "web");
        assert_eq!(state.status, "deployed");
        assert_eq!(state.version, "1.2.0");
        assert!(state.manifest.is_none());

        let metadata = state.metadata.unwrap();
        assert_eq!(metadata.revision, 1);
        assert_eq!(metadata.app_version, "2.0");
        let values: serde_json::Value = serde_json::from_str(&metadata.values).unwrap();
        assert_eq!(values["auth"]["password"], SENSITIVE_VALUE);
        assert_eq!(values["replicaCount"], 2);

        // the cluster receives the real value
        let release = driver.all_releases().pop().unwrap();
        assert_eq!(release.config.get("auth.password").unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_timeout() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let mut config = release_config(&temp);
        config.timeout = 9_223_372_036_854_775;

        let err = ReleaseResource::new(&meta).create(&config).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));
        assert_eq!(driver.operation_counts().installs, 0);
    }

    #[tokio::test]
    async fn test_create_with_manifest_redacts_secrets() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, true);
        let mut config = release_config(&temp);
        config.set_sensitive = vec![ValueOverride::new("token", "s3cr3t-token")];

        let state = ReleaseResource::new(&meta).create(&config).await.unwrap().state;
        let manifest = state.manifest.unwrap();
        assert!(manifest.contains(SENSITIVE_VALUE));
        assert!(!manifest.contains("s3cr3t-token"));
    }

    #[tokio::test]
    async fn test_create_failed_release_is_recorded_with_warning() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        driver.fail_next_install_with("timed out waiting for the condition");
        let meta = meta(&temp, &driver, false);

        let applied = ReleaseResource::new(&meta).create(&release_config(&temp)).await.unwrap();
        assert_eq!(applied.state.status, "failed");
        assert!(applied.has_warnings());
        assert_eq!(
            applied.diagnostics[0].detail.as_deref(),
            Some("timed out waiting for the condition")
        );
    }

    #[tokio::test]
    async fn test_create_replaces_failed_release() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        driver.fail_next_install_with("boom");
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);

        resource.create(&config).await.unwrap();
        let applied = resource.create(&config).await.unwrap();

        assert_eq!(applied.state.status, "deployed");
        assert!(applied.diagnostics.is_empty());
        assert_eq!(driver.operation_counts().uninstalls, 1);
    }

    #[tokio::test]
    async fn test_create_fails_when_name_in_use() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);

        resource.create(&config).await.unwrap();
        let err = resource.create(&config).await.unwrap_err();
        assert!(err.to_string().contains("cannot re-use a name"));
        assert_eq!(driver.operation_counts().uninstalls, 0);
    }

    #[tokio::test]
    async fn test_create_missing_dependencies() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);

        let chart = temp.path().join("chart");
        write_chart(
            &chart,
            "dependencies:\n  - name: redis\n    version: 17.0.0\n    repository: https://charts.example.com\n",
        );
        let mut config = ReleaseConfig::new("web", chart.to_string_lossy());

        let err = ReleaseResource::new(&meta).create(&config).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Release(ReleaseError::DependencyCheckFailed { .. })
        ));
        assert!(err.to_string().contains("redis"));

        config.dependency_update = true;
        let applied = ReleaseResource::new(&meta).create(&config).await.unwrap();
        assert_eq!(applied.state.status, "deployed");
        assert_eq!(driver.operation_counts().dependency_updates, 1);
    }

    #[tokio::test]
    async fn test_create_library_chart() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);

        let chart = temp.path().join("chart");
        write_chart(&chart, "type: library\n");
        let config = ReleaseConfig::new("web", chart.to_string_lossy());

        let err = ReleaseResource::new(&meta).create(&config).await.unwrap_err();
        assert!(err.to_string().contains("not installable"));
        assert_eq!(driver.operation_counts().installs, 0);
    }

    #[tokio::test]
    async fn test_create_lint_failure() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        driver.set_lint_errors(vec!["templates/: parse error".to_string()]);
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);

        let mut config = release_config(&temp);
        // lint only runs when enabled
        let state = resource.create(&config).await.unwrap().state;
        resource.delete(&state).await.unwrap();

        config.lint = true;
        let err = resource.create(&config).await.unwrap_err();
        assert!(err.to_string().starts_with("malformed chart or values"));
        assert_eq!(driver.operation_counts().lints, 1);
    }

    #[tokio::test]
    async fn test_create_invalid_values() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let mut config = release_config(&temp);
        config.values = vec!["- just\n- a list\n".to_string()];

        let err = ReleaseResource::new(&meta).create(&config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Core(_)));
    }

    #[tokio::test]
    async fn test_read_refreshes_and_detects_removal() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);

        let state = resource.create(&config).await.unwrap().state;
        let refreshed = resource.read(&state).await.unwrap().unwrap();
        assert_eq!(refreshed, state);

        resource.delete(&state).await.unwrap();
        assert!(resource.read(&state).await.unwrap().is_none());
        assert!(!resource.exists(&state).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_upgrades() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);

        let prior = resource.create(&config).await.unwrap().state;
        let mut next = config.clone();
        next.values = vec!["replicaCount: 5\n".to_string()];
        next.max_history = 3;

        let applied = resource.update(&prior, &next).await.unwrap();
        let metadata = applied.state.metadata.unwrap();
        assert_eq!(metadata.revision, 2);
        assert!(metadata.values.contains("5"));
        assert_eq!(driver.operation_counts().upgrades, 1);
    }

    #[tokio::test]
    async fn test_update_error_propagates() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);

        let prior = resource.create(&config).await.unwrap().state;
        driver.fail_next_upgrade_with("UPGRADE FAILED: context deadline exceeded");

        let err = resource.update(&prior, &config).await.unwrap_err();
        assert_eq!(err.to_string(), "UPGRADE FAILED: context deadline exceeded");
    }

    #[tokio::test]
    async fn test_update_namespace_change_replaces() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);

        let prior = resource.create(&config).await.unwrap().state;
        let moved = config.clone().with_namespace("apps");
        let applied = resource.update(&prior, &moved).await.unwrap();

        assert_eq!(applied.state.metadata.unwrap().namespace, "apps");
        assert_eq!(driver.operation_counts().uninstalls, 1);
        assert_eq!(driver.release_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_absent_release() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let state = ReleaseResource::new(&meta)
            .create(&release_config(&temp))
            .await
            .unwrap()
            .state;

        let resource = ReleaseResource::new(&meta);
        resource.delete(&state).await.unwrap();
        resource.delete(&state).await.unwrap();
        assert_eq!(driver.operation_counts().uninstalls, 2);
    }

    #[tokio::test]
    async fn test_import() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        resource.create(&release_config(&temp)).await.unwrap();

        let state = resource.import("default/web").await.unwrap();
        assert_eq!(state.id, "web");
        assert_eq!(state.config.chart, "web");
        assert_eq!(state.config.version, "1.2.0");
        assert_eq!(state.config.timeout, 300);
        assert!(state.config.wait);
        assert_eq!(state.config.values, vec!["replicaCount: 2\n"]);
    }

    #[tokio::test]
    async fn test_import_errors() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);

        let err = resource.import("web").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Unexpected ID format ("web"), expected namespace/name"#
        );
        assert!(resource.import("default/web").await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_parse_import_id() {
        assert_eq!(parse_import_id("apps/web").unwrap(), ("apps", "web"));
        assert!(parse_import_id("/web").is_err());
        assert!(parse_import_id("apps/").is_err());
        assert!(parse_import_id("a/b/c").is_err());
    }

    #[tokio::test]
    async fn test_plan_new_release() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, true);
        let mut config = release_config(&temp);
        config.set_sensitive = vec![ValueOverride::new("password", "hunter2")];

        let plan = ReleaseResource::new(&meta).plan(None, &config).await.unwrap();
        assert_eq!(plan.status, Planned::Known(ReleaseStatus::Deployed));
        assert_eq!(plan.version, Planned::Known("1.2.0".to_string()));
        assert!(plan.metadata_unknown);

        let manifest = plan.manifest.unwrap();
        let manifest = manifest.known().unwrap();
        assert!(manifest.contains(SENSITIVE_VALUE));
        assert!(!manifest.contains("hunter2"));
        assert_eq!(driver.release_count(), 0);
    }

    #[tokio::test]
    async fn test_plan_unchanged_release() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);
        let prior = resource.create(&config).await.unwrap().state;

        let plan = resource.plan(Some(&prior), &config).await.unwrap();
        assert!(!plan.metadata_unknown);
        assert_eq!(plan.version, Planned::Known("1.2.0".to_string()));
        assert!(plan.manifest.is_none());

        let mut changed = config.clone();
        changed.set.push(ValueOverride::new("image.tag", "v2"));
        let plan = resource.plan(Some(&prior), &changed).await.unwrap();
        assert!(plan.metadata_unknown);
    }

    #[tokio::test]
    async fn test_plan_local_chart_version_bump() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, false);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);
        let prior = resource.create(&config).await.unwrap().state;

        let chart_yaml = temp.path().join("chart/Chart.yaml");
        std::fs::write(&chart_yaml, "apiVersion: v2\nname: web\nversion: 1.3.0\n").unwrap();

        let plan = resource.plan(Some(&prior), &config).await.unwrap();
        assert_eq!(plan.version, Planned::Known("1.3.0".to_string()));
        assert!(plan.metadata_unknown);
    }

    #[tokio::test]
    async fn test_plan_unreadable_chart() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, true);
        let config = ReleaseConfig::new("web", "/nonexistent/helmform/chart");

        let plan = ReleaseResource::new(&meta).plan(None, &config).await.unwrap();
        assert_eq!(plan.version, Planned::Unknown);
        assert_eq!(plan.manifest, Some(Planned::Unknown));
        assert_eq!(driver.operation_counts().installs, 0);
    }

    #[tokio::test]
    async fn test_plan_no_deployed_releases() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, true);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);
        let prior = resource.create(&config).await.unwrap().state;

        driver.fail_next_upgrade_with("UPGRADE FAILED: \"web\" has no deployed releases");
        let plan = resource.plan(Some(&prior), &config).await.unwrap();
        assert_eq!(plan.manifest, Some(Planned::Unknown));
        assert_eq!(plan.version, Planned::Unknown);
    }

    #[tokio::test]
    async fn test_plan_dry_run_error_fails() {
        let temp = TempDir::new().unwrap();
        let driver = MockReleaseDriver::new();
        let meta = meta(&temp, &driver, true);
        let resource = ReleaseResource::new(&meta);
        let config = release_config(&temp);
        let prior = resource.create(&config).await.unwrap().state;

        driver.fail_next_upgrade_with("admission webhook denied the request");
        let err = resource.plan(Some(&prior), &config).await.unwrap_err();
        assert_eq!(err.to_string(), "admission webhook denied the request");
    }
}
