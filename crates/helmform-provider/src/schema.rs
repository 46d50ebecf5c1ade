//! Typed inputs and computed state of the provider's resources

use chrono::{DateTime, Duration, Utc};
use helmform_core::{ChartReference, ListOverride, LoadedChart, ValueOverride, ValueSources, Values};
use helmform_release::{InstallOptions, PostRender, Release, RenderOptions, UninstallOptions, UpgradeOptions};
use helmform_repo::ResolveOptions;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

fn default_namespace() -> String {
    "default".to_string()
}

fn default_timeout() -> i64 {
    300
}

fn default_true() -> bool {
    true
}

/// Inputs of a `helm_release` resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub name: String,

    pub chart: String,

    /// Repository URL or alias
    #[serde(default)]
    pub repository: String,

    /// Version constraint, empty for the latest
    #[serde(default)]
    pub version: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    pub description: Option<String>,

    /// Raw YAML overlays, merged in order
    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default)]
    pub set: Vec<ValueOverride>,

    #[serde(default)]
    pub set_sensitive: Vec<ValueOverride>,

    #[serde(default)]
    pub set_list: Vec<ListOverride>,

    pub repository_username: Option<String>,
    pub repository_password: Option<String>,
    pub repository_ca_file: Option<String>,
    pub repository_cert_file: Option<String>,
    pub repository_key_file: Option<String>,

    #[serde(default)]
    pub pass_credentials: bool,

    #[serde(default)]
    pub verify: bool,

    #[serde(default)]
    pub devel: bool,

    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: i64,

    #[serde(default)]
    pub disable_webhooks: bool,

    #[serde(default)]
    pub disable_crd_hooks: bool,

    #[serde(default)]
    pub disable_openapi_validation: bool,

    #[serde(default)]
    pub reuse_values: bool,

    #[serde(default)]
    pub reset_values: bool,

    #[serde(default)]
    pub force_update: bool,

    #[serde(default)]
    pub recreate_pods: bool,

    #[serde(default)]
    pub cleanup_on_fail: bool,

    #[serde(default)]
    pub max_history: u32,

    #[serde(default)]
    pub atomic: bool,

    #[serde(default)]
    pub skip_crds: bool,

    #[serde(default = "default_true")]
    pub render_subchart_notes: bool,

    #[serde(default = "default_true")]
    pub wait: bool,

    #[serde(default)]
    pub wait_for_jobs: bool,

    #[serde(default)]
    pub create_namespace: bool,

    #[serde(default)]
    pub lint: bool,

    #[serde(default)]
    pub dependency_update: bool,

    #[serde(default)]
    pub replace: bool,

    pub postrender: Option<PostRender>,
}

impl ReleaseConfig {
    /// A configuration with every optional input at its default
    pub fn new(name: impl Into<String>, chart: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            repository: String::new(),
            version: String::new(),
            namespace: default_namespace(),
            description: None,
            values: Vec::new(),
            set: Vec::new(),
            set_sensitive: Vec::new(),
            set_list: Vec::new(),
            repository_username: None,
            repository_password: None,
            repository_ca_file: None,
            repository_cert_file: None,
            repository_key_file: None,
            pass_credentials: false,
            verify: false,
            devel: false,
            timeout: default_timeout(),
            disable_webhooks: false,
            disable_crd_hooks: false,
            disable_openapi_validation: false,
            reuse_values: false,
            reset_values: false,
            force_update: false,
            recreate_pods: false,
            cleanup_on_fail: false,
            max_history: 0,
            atomic: false,
            skip_crds: false,
            render_subchart_notes: true,
            wait: true,
            wait_for_jobs: false,
            create_namespace: false,
            lint: false,
            dependency_update: false,
            replace: false,
            postrender: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// `[namespace/name]` prefix for log lines
    pub fn log_id(&self) -> String {
        format!("[{}/{}]", self.namespace, self.name)
    }

    pub fn chart_reference(&self) -> ChartReference {
        ChartReference::parse(&self.chart, &self.repository, &self.version)
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            verify: self.verify,
            devel: self.devel,
            username: self.repository_username.clone(),
            password: self.repository_password.clone(),
            ca_file: self.repository_ca_file.clone(),
            cert_file: self.repository_cert_file.clone(),
            key_file: self.repository_key_file.clone(),
            insecure_skip_tls_verify: false,
            pass_credentials: self.pass_credentials,
        }
    }

    pub fn value_sources(&self) -> ValueSources {
        ValueSources {
            values: self.values.clone(),
            set: self.set.clone(),
            set_sensitive: self.set_sensitive.clone(),
            set_list: self.set_list.clone(),
        }
    }

    /// Reject attribute values the driver cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.timeout < 0 || Duration::try_seconds(self.timeout).is_none() {
            return Err(ProviderError::InvalidConfig(format!(
                "timeout must be a non-negative number of seconds, got {}",
                self.timeout
            )));
        }
        Ok(())
    }

    /// Timeout clamped to the representable range
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_seconds(self.timeout.max(0)).unwrap_or(Duration::MAX)
    }

    /// Chart, repository, version, values or an override differ
    pub fn inputs_changed(&self, prior: &ReleaseConfig) -> bool {
        self.chart != prior.chart
            || self.repository != prior.repository
            || self.version != prior.version
            || self.values != prior.values
            || self.set != prior.set
            || self.set_sensitive != prior.set_sensitive
            || self.set_list != prior.set_list
    }

    pub fn install_options(&self, chart: LoadedChart, values: Values) -> InstallOptions {
        let mut options = InstallOptions::new(&self.name, &self.namespace, chart).with_values(values);
        options.wait = self.wait;
        options.wait_for_jobs = self.wait_for_jobs;
        options.timeout = self.timeout_duration();
        options.atomic = self.atomic;
        options.create_namespace = self.create_namespace;
        options.skip_crds = self.skip_crds;
        options.disable_webhooks = self.disable_webhooks;
        options.disable_openapi_validation = self.disable_openapi_validation;
        options.replace = self.replace;
        options.render_subchart_notes = self.render_subchart_notes;
        options.description = self.description.clone();
        options.postrender = self.postrender.clone();
        options
    }

    pub fn upgrade_options(&self, chart: LoadedChart, values: Values) -> UpgradeOptions {
        let mut options = UpgradeOptions::new(&self.name, &self.namespace, chart).with_values(values);
        options.wait = self.wait;
        options.wait_for_jobs = self.wait_for_jobs;
        options.timeout = self.timeout_duration();
        options.atomic = self.atomic;
        options.force = self.force_update;
        options.recreate_pods = self.recreate_pods;
        options.cleanup_on_fail = self.cleanup_on_fail;
        options.max_history = self.max_history;
        options.reset_values = self.reset_values;
        options.reuse_values = self.reuse_values;
        options.skip_crds = self.skip_crds;
        options.disable_webhooks = self.disable_webhooks;
        options.disable_openapi_validation = self.disable_openapi_validation;
        options.render_subchart_notes = self.render_subchart_notes;
        options.description = self.description.clone();
        options.postrender = self.postrender.clone();
        options
    }

    pub fn uninstall_options(&self) -> UninstallOptions {
        let mut options = UninstallOptions::new(&self.name, &self.namespace);
        options.wait = self.wait;
        options.timeout = self.timeout_duration();
        options.disable_webhooks = self.disable_webhooks;
        options.keep_history = false;
        options.description = self.description.clone();
        options
    }
}

/// Computed attributes of a deployed release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub name: String,
    pub revision: u32,
    pub namespace: String,
    pub chart: String,
    pub version: String,
    pub app_version: String,
    /// JSON of the cloaked values tree
    pub values: String,
    /// Unix seconds
    pub first_deployed: i64,
    /// Unix seconds
    pub last_deployed: i64,
    pub notes: String,
}

impl ReleaseMetadata {
    pub fn from_release(release: &Release, cloaked_values: String) -> Self {
        Self {
            name: release.name.clone(),
            revision: release.version,
            namespace: release.namespace.clone(),
            chart: release.chart_name().to_string(),
            version: release.chart_version().to_string(),
            app_version: release.app_version().unwrap_or_default().to_string(),
            values: cloaked_values,
            first_deployed: unix(release.info.first_deployed),
            last_deployed: unix(release.info.last_deployed),
            notes: release.notes().to_string(),
        }
    }
}

fn unix(time: Option<DateTime<Utc>>) -> i64 {
    time.map(|t| t.timestamp()).unwrap_or_default()
}

/// Recorded state of a `helm_release` resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseState {
    /// Release name
    pub id: String,
    pub config: ReleaseConfig,
    pub status: String,
    /// Chart version
    pub version: String,
    pub metadata: Option<ReleaseMetadata>,
    /// Normalized JSON manifest, only with the manifest experiment
    pub manifest: Option<String>,
}

impl ReleaseState {
    pub fn log_id(&self) -> String {
        self.config.log_id()
    }
}

/// Inputs of a `helm_template` data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(flatten)]
    pub release: ReleaseConfig,

    /// Template paths to keep, relative to the chart
    #[serde(default)]
    pub show_only: Vec<String>,

    #[serde(default)]
    pub include_crds: bool,

    #[serde(default)]
    pub is_upgrade: bool,

    pub kube_version: Option<String>,

    #[serde(default)]
    pub api_versions: Vec<String>,

    #[serde(default)]
    pub validate: bool,

    #[serde(default)]
    pub skip_tests: bool,
}

impl TemplateConfig {
    pub fn new(release: ReleaseConfig) -> Self {
        Self {
            release,
            show_only: Vec::new(),
            include_crds: false,
            is_upgrade: false,
            kube_version: None,
            api_versions: Vec::new(),
            validate: false,
            skip_tests: false,
        }
    }

    pub fn render_options(&self, chart: LoadedChart, values: Values) -> RenderOptions {
        let release = &self.release;
        let mut options = RenderOptions::new(&release.name, &release.namespace, chart).with_values(values);
        options.include_crds = self.include_crds;
        options.is_upgrade = self.is_upgrade;
        options.validate = self.validate;
        options.skip_tests = self.skip_tests;
        options.skip_crds = release.skip_crds;
        options.kube_version = self.kube_version.clone();
        options.api_versions = self.api_versions.clone();
        options.create_namespace = release.create_namespace;
        options.disable_webhooks = release.disable_webhooks;
        options.render_subchart_notes = release.render_subchart_notes;
        options.description = release.description.clone();
        options.postrender = release.postrender.clone();
        options
    }
}

/// Outputs of a `helm_template` data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateState {
    /// Release name
    pub id: String,
    /// Rendered documents keyed by `<chart>/<template path>`
    pub manifests: std::collections::BTreeMap<String, String>,
    pub manifest: String,
    pub crds: Vec<String>,
    pub notes: String,
}

/// Inputs of the legacy `helm_repository` data source and resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Repository name
    pub id: String,
    pub config: RepositoryConfig,
    pub metadata: RepositoryMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmform_core::{ChartMetadata, OverrideKind};
    use std::path::PathBuf;

    fn empty_chart() -> LoadedChart {
        LoadedChart {
            metadata: ChartMetadata::default(),
            values: Values::new(),
            crds: Vec::new(),
            templates: Vec::new(),
            subcharts: Vec::new(),
            path: PathBuf::new(),
        }
    }

    #[test]
    fn test_release_config_defaults() {
        let config: ReleaseConfig =
            serde_json::from_str(r#"{"name": "web", "chart": "nginx"}"#).unwrap();

        assert_eq!(config, ReleaseConfig::new("web", "nginx"));
        assert_eq!(config.namespace, "default");
        assert_eq!(config.timeout, 300);
        assert!(config.wait);
        assert!(config.render_subchart_notes);
        assert!(!config.atomic);
        assert!(!config.lint);
        assert_eq!(config.max_history, 0);
    }

    #[test]
    fn test_release_config_overrides() {
        let config: ReleaseConfig = serde_json::from_value(serde_json::json!({
            "name": "web",
            "chart": "nginx",
            "repository": "https://charts.example.com",
            "values": ["replicas: 2"],
            "set": [{"name": "image.tag", "value": "1.2", "type": "string"}],
            "set_sensitive": [{"name": "auth.password", "value": "hunter2"}],
            "set_list": [{"name": "hosts", "value": ["a", "b"]}],
            "postrender": {"binary_path": "kustomize"}
        }))
        .unwrap();

        assert_eq!(config.set[0].kind, OverrideKind::String);
        assert_eq!(config.set_sensitive[0].kind, OverrideKind::Auto);
        assert_eq!(config.set_list[0].value, vec!["a", "b"]);
        assert_eq!(config.postrender.as_ref().unwrap().binary_path, "kustomize");

        let sources = config.value_sources();
        assert_eq!(sources.sensitive_literals(), vec!["hunter2"]);

        let reference = config.chart_reference();
        assert_eq!(reference.repository_url(), Some("https://charts.example.com"));
    }

    #[test]
    fn test_inputs_changed() {
        let prior = ReleaseConfig::new("web", "nginx");

        let mut same = prior.clone();
        same.wait = false;
        same.timeout = 60;
        assert!(!same.inputs_changed(&prior));

        let mut bumped = prior.clone();
        bumped.version = "2.0.0".to_string();
        assert!(bumped.inputs_changed(&prior));

        let mut secret = prior.clone();
        secret.set_sensitive.push(ValueOverride::new("password", "x"));
        assert!(secret.inputs_changed(&prior));
    }

    #[test]
    fn test_upgrade_options_carry_flags() {
        let mut config = ReleaseConfig::new("web", "nginx");
        config.force_update = true;
        config.cleanup_on_fail = true;
        config.max_history = 5;
        config.reuse_values = true;
        config.timeout = 60;

        let options = config.upgrade_options(empty_chart(), Values::new());
        assert!(options.force);
        assert!(options.cleanup_on_fail);
        assert_eq!(options.max_history, 5);
        assert!(options.reuse_values);
        assert_eq!(options.timeout, Duration::seconds(60));
        assert_eq!(options.namespace, "default");
    }

    #[test]
    fn test_timeout_out_of_range() {
        let mut config = ReleaseConfig::new("web", "nginx");
        assert!(config.validate().is_ok());

        config.timeout = 9_223_372_036_854_775;
        assert!(matches!(config.validate(), Err(ProviderError::InvalidConfig(_))));
        assert_eq!(config.timeout_duration(), Duration::MAX);

        config.timeout = -5;
        assert!(matches!(config.validate(), Err(ProviderError::InvalidConfig(_))));
        assert_eq!(config.timeout_duration(), Duration::zero());
    }

    #[test]
    fn test_uninstall_options() {
        let mut config = ReleaseConfig::new("web", "nginx").with_namespace("apps");
        config.wait = false;
        config.disable_webhooks = true;

        let options = config.uninstall_options();
        assert_eq!(options.namespace, "apps");
        assert!(!options.wait);
        assert!(options.disable_webhooks);
        assert!(!options.keep_history);
    }

    #[test]
    fn test_template_config_flatten() {
        let config: TemplateConfig = serde_json::from_value(serde_json::json!({
            "name": "web",
            "chart": "./chart",
            "show_only": ["templates/service.yaml"],
            "include_crds": true
        }))
        .unwrap();

        assert_eq!(config.release.name, "web");
        assert_eq!(config.release.namespace, "default");
        assert_eq!(config.show_only, vec!["templates/service.yaml"]);
        assert!(config.include_crds);
        assert!(!config.skip_tests);
    }

    #[test]
    fn test_metadata_from_release() {
        let release: Release = serde_json::from_value(serde_json::json!({
            "name": "web",
            "namespace": "apps",
            "version": 3,
            "info": {
                "first_deployed": "2024-01-01T00:00:00Z",
                "last_deployed": "2024-01-02T00:00:00Z",
                "status": "deployed",
                "notes": "hello"
            },
            "chart": {"metadata": {"name": "nginx", "version": "1.0.0", "appVersion": "1.25"}},
            "config": null,
            "manifest": ""
        }))
        .unwrap();

        let metadata = ReleaseMetadata::from_release(&release, "{}".to_string());
        assert_eq!(metadata.revision, 3);
        assert_eq!(metadata.chart, "nginx");
        assert_eq!(metadata.app_version, "1.25");
        assert_eq!(metadata.first_deployed, 1704067200);
        assert_eq!(metadata.last_deployed, 1704153600);
        assert_eq!(metadata.notes, "hello");
    }
}
