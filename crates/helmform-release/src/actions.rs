//! Options for install, upgrade, uninstall, render and lint operations

use chrono::Duration;
use helmform_core::{LoadedChart, Values};
use serde::{Deserialize, Serialize};

/// Default timeout for a release operation (5 minutes)
pub const DEFAULT_TIMEOUT_SECS: i64 = 300;

/// How a dry-run validates the rendered manifest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DryRunMode {
    /// Apply for real
    #[default]
    None,
    /// Render without contacting the cluster
    Client,
    /// Render and validate against the API server
    Server,
}

impl DryRunMode {
    pub fn is_dry_run(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Value of the `--dry-run` flag
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Client => Some("--dry-run=client"),
            Self::Server => Some("--dry-run=server"),
        }
    }
}

/// Binary that post-processes the rendered manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRender {
    pub binary_path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Options for install operation
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Loaded chart, including the path it was resolved to
    pub chart: LoadedChart,

    /// Fully merged values; never the cloaked copy
    pub values: Values,

    /// Wait for resources to be ready
    pub wait: bool,

    /// Wait for jobs to complete (only with wait=true)
    pub wait_for_jobs: bool,

    pub timeout: Duration,

    /// Uninstall on failure (implies wait)
    pub atomic: bool,

    /// Create namespace if it doesn't exist
    pub create_namespace: bool,

    pub skip_crds: bool,

    /// Skip hooks
    pub disable_webhooks: bool,

    pub disable_openapi_validation: bool,

    /// Re-use the name of a deleted or failed release
    pub replace: bool,

    pub render_subchart_notes: bool,

    pub description: Option<String>,

    pub postrender: Option<PostRender>,

    pub dry_run: DryRunMode,
}

impl InstallOptions {
    /// Create default install options for a chart
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, chart: LoadedChart) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart,
            values: Values::new(),
            wait: true,
            wait_for_jobs: false,
            timeout: Duration::seconds(DEFAULT_TIMEOUT_SECS),
            atomic: false,
            create_namespace: false,
            skip_crds: false,
            disable_webhooks: false,
            disable_openapi_validation: false,
            replace: false,
            render_subchart_notes: true,
            description: None,
            postrender: None,
            dry_run: DryRunMode::None,
        }
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }

    /// Enable atomic mode (uninstall on failure)
    pub fn with_atomic(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.atomic = true;
        self.timeout = timeout;
        self
    }

    /// Enable dry-run mode
    pub fn dry_run(mut self, mode: DryRunMode) -> Self {
        self.dry_run = mode;
        self
    }
}

/// Options for upgrade operation
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    pub name: String,

    pub namespace: String,

    pub chart: LoadedChart,

    /// Fully merged values; never the cloaked copy
    pub values: Values,

    pub wait: bool,

    pub wait_for_jobs: bool,

    pub timeout: Duration,

    /// Roll back on failure
    pub atomic: bool,

    /// Force resource updates through delete/recreate
    pub force: bool,

    /// Restart pods for the resource if applicable
    pub recreate_pods: bool,

    /// Delete resources created during a failed upgrade
    pub cleanup_on_fail: bool,

    /// Maximum revisions kept, 0 for unlimited
    pub max_history: u32,

    /// Reset values to the chart defaults
    pub reset_values: bool,

    /// Reuse values from the previous release
    pub reuse_values: bool,

    pub skip_crds: bool,

    pub disable_webhooks: bool,

    pub disable_openapi_validation: bool,

    pub render_subchart_notes: bool,

    pub description: Option<String>,

    pub postrender: Option<PostRender>,

    pub dry_run: DryRunMode,
}

impl UpgradeOptions {
    /// Create default upgrade options for a chart
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, chart: LoadedChart) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart,
            values: Values::new(),
            wait: true,
            wait_for_jobs: false,
            timeout: Duration::seconds(DEFAULT_TIMEOUT_SECS),
            atomic: false,
            force: false,
            recreate_pods: false,
            cleanup_on_fail: false,
            max_history: 0,
            reset_values: false,
            reuse_values: false,
            skip_crds: false,
            disable_webhooks: false,
            disable_openapi_validation: false,
            render_subchart_notes: true,
            description: None,
            postrender: None,
            dry_run: DryRunMode::None,
        }
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }

    /// Enable force mode
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn dry_run(mut self, mode: DryRunMode) -> Self {
        self.dry_run = mode;
        self
    }
}

/// Options for uninstall operation
#[derive(Debug, Clone)]
pub struct UninstallOptions {
    pub name: String,

    pub namespace: String,

    /// Wait for resources to be deleted
    pub wait: bool,

    pub timeout: Duration,

    pub disable_webhooks: bool,

    /// Keep release history
    pub keep_history: bool,

    pub description: Option<String>,
}

impl UninstallOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            wait: false,
            timeout: Duration::seconds(DEFAULT_TIMEOUT_SECS),
            disable_webhooks: false,
            keep_history: false,
            description: None,
        }
    }

    /// Wait for deletion to complete
    pub fn with_wait(mut self, timeout: Duration) -> Self {
        self.wait = true;
        self.timeout = timeout;
        self
    }
}

/// Options for rendering a chart without installing it
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub name: String,

    pub namespace: String,

    pub chart: LoadedChart,

    pub values: Values,

    /// Include CRDs in the rendered manifest
    pub include_crds: bool,

    /// Set `.Release.IsUpgrade` instead of `.Release.IsInstall`
    pub is_upgrade: bool,

    /// Validate against the cluster instead of rendering offline
    pub validate: bool,

    pub skip_tests: bool,

    pub skip_crds: bool,

    /// Kubernetes version used for `Capabilities.KubeVersion`
    pub kube_version: Option<String>,

    /// Extra API versions for `Capabilities.APIVersions`
    pub api_versions: Vec<String>,

    pub create_namespace: bool,

    pub disable_webhooks: bool,

    pub render_subchart_notes: bool,

    pub description: Option<String>,

    pub postrender: Option<PostRender>,
}

impl RenderOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, chart: LoadedChart) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            chart,
            values: Values::new(),
            include_crds: false,
            is_upgrade: false,
            validate: false,
            skip_tests: false,
            skip_crds: false,
            kube_version: None,
            api_versions: Vec::new(),
            create_namespace: false,
            disable_webhooks: false,
            render_subchart_notes: true,
            description: None,
            postrender: None,
        }
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }
}

/// Format a timeout the way Helm's `--timeout` flag expects it
pub fn timeout_flag(timeout: Duration) -> String {
    format!("{}s", timeout.num_seconds().max(0))
}
