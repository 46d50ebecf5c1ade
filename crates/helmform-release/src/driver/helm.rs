//! Release driver backed by the `helm` binary
//!
//! Every action is one `helm` invocation. Values are handed over in a
//! temporary JSON file so that nothing sensitive shows up on the command
//! line, and results are read back from `--output json`.

use async_trait::async_trait;
use helmform_core::{LoadedChart, Values};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::NamedTempFile;
use tokio::process::Command;

use super::ReleaseDriver;
use crate::actions::{
    InstallOptions, PostRender, RenderOptions, UninstallOptions, UpgradeOptions, timeout_flag,
};
use crate::error::{ReleaseError, Result};
use crate::release::{Release, ReleaseChart, ReleaseInfo, ReleaseStatus};

/// Settings shared by every `helm` invocation
#[derive(Debug, Clone)]
pub struct HelmSettings {
    /// Path or name of the `helm` binary
    pub binary: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    pub kube_context: Option<String>,
    /// Release storage driver: `configmap`, `secret` or `memory`
    pub storage_driver: String,
    pub debug: bool,
    pub burst_limit: u32,
    pub plugins_path: Option<PathBuf>,
    pub registry_config: Option<PathBuf>,
    pub repository_config: Option<PathBuf>,
    pub repository_cache: Option<PathBuf>,
}

impl Default for HelmSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("helm"),
            kubeconfig: None,
            kube_context: None,
            storage_driver: "secret".to_string(),
            debug: false,
            burst_limit: 100,
            plugins_path: None,
            registry_config: None,
            repository_config: None,
            repository_cache: None,
        }
    }
}

impl HelmSettings {
    /// Flags placed before every subcommand's own arguments
    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        push_path(&mut args, "--kubeconfig", self.kubeconfig.as_deref());
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        push_path(&mut args, "--registry-config", self.registry_config.as_deref());
        push_path(&mut args, "--repository-config", self.repository_config.as_deref());
        push_path(&mut args, "--repository-cache", self.repository_cache.as_deref());
        args.push(format!("--burst-limit={}", self.burst_limit));
        if self.debug {
            args.push("--debug".to_string());
        }
        args
    }
}

/// Shells out to `helm` for every release action
#[derive(Debug, Clone, Default)]
pub struct HelmCliDriver {
    settings: HelmSettings,
}

impl HelmCliDriver {
    pub fn new(settings: HelmSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &HelmSettings {
        &self.settings
    }

    /// Run `helm` and fail on a non-zero exit status
    async fn run(&self, args: &[String], namespace: &str, name: &str) -> Result<Output> {
        let output = self.spawn(args).await?;
        if !output.status.success() {
            return Err(classify_error(&String::from_utf8_lossy(&output.stderr), name, namespace));
        }
        Ok(output)
    }

    async fn spawn(&self, args: &[String]) -> Result<Output> {
        let mut cmd = Command::new(&self.settings.binary);
        cmd.args(self.settings.global_args())
            .args(args)
            .env("HELM_DRIVER", &self.settings.storage_driver)
            .kill_on_drop(true);
        if let Some(plugins) = &self.settings.plugins_path {
            cmd.env("HELM_PLUGINS", plugins);
        }

        tracing::debug!("running {} {}", self.settings.binary.display(), args.join(" "));
        cmd.output().await.map_err(|e| {
            ReleaseError::Helm(format!(
                "failed to run {}: {}",
                self.settings.binary.display(),
                e
            ))
        })
    }

    /// Turn an install/upgrade error into `ReleaseFailed` when a release was
    /// recorded anyway
    async fn with_recorded_release(&self, err: ReleaseError, namespace: &str, name: &str) -> ReleaseError {
        if err.is_not_found() {
            return err;
        }
        match self.get(namespace, name).await {
            Ok(release) if release.status() != ReleaseStatus::Deployed => ReleaseError::ReleaseFailed {
                release: Box::new(release),
                message: err.to_string(),
            },
            _ => err,
        }
    }
}

#[async_trait]
impl ReleaseDriver for HelmCliDriver {
    async fn get(&self, namespace: &str, name: &str) -> Result<Release> {
        let args = status_args(namespace, name);
        let output = self.run(&args, namespace, name).await?;
        parse_release(&output.stdout)
    }

    async fn install(&self, options: &InstallOptions) -> Result<Release> {
        let values = values_file(&options.values)?;
        let args = install_args(options, values.path());

        match self.run(&args, &options.namespace, &options.name).await {
            Ok(output) => parse_release(&output.stdout),
            Err(err) if options.dry_run.is_dry_run() => Err(err),
            Err(err) => Err(self.with_recorded_release(err, &options.namespace, &options.name).await),
        }
    }

    async fn upgrade(&self, options: &UpgradeOptions) -> Result<Release> {
        if options.recreate_pods {
            tracing::warn!(
                "[{}/{}] recreate_pods is not supported by helm 3 and is ignored",
                options.namespace,
                options.name
            );
        }
        let values = values_file(&options.values)?;
        let args = upgrade_args(options, values.path());

        match self.run(&args, &options.namespace, &options.name).await {
            Ok(output) => parse_release(&output.stdout),
            Err(err) if options.dry_run.is_dry_run() => Err(err),
            Err(err) => Err(self.with_recorded_release(err, &options.namespace, &options.name).await),
        }
    }

    async fn uninstall(&self, options: &UninstallOptions) -> Result<()> {
        let args = uninstall_args(options);
        self.run(&args, &options.namespace, &options.name).await?;
        Ok(())
    }

    async fn render(&self, options: &RenderOptions) -> Result<Release> {
        let values = values_file(&options.values)?;
        let args = template_args(options, values.path());
        let output = self.run(&args, &options.namespace, &options.name).await?;

        // `helm template` prints the manifest with hooks inline
        Ok(Release {
            name: options.name.clone(),
            namespace: options.namespace.clone(),
            version: 1,
            info: ReleaseInfo {
                status: ReleaseStatus::PendingInstall,
                ..Default::default()
            },
            chart: ReleaseChart::from(options.chart.metadata.clone()),
            config: options.values.clone(),
            manifest: String::from_utf8_lossy(&output.stdout).to_string(),
            hooks: Vec::new(),
        })
    }

    async fn lint(&self, chart: &LoadedChart, namespace: &str, values: &Values) -> Result<()> {
        let file = values_file(values)?;
        let args = vec![
            "lint".to_string(),
            chart.path.display().to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--values".to_string(),
            file.path().display().to_string(),
        ];

        let output = self.spawn(&args).await?;
        if output.status.success() {
            return Ok(());
        }

        let messages = lint_messages(&String::from_utf8_lossy(&output.stdout));
        if messages.is_empty() {
            return Err(classify_error(&String::from_utf8_lossy(&output.stderr), chart.name(), namespace));
        }
        Err(ReleaseError::LintFailed {
            chart: chart.name().to_string(),
            messages,
        })
    }

    async fn dependency_update(&self, chart_path: &Path) -> Result<()> {
        let args = vec![
            "dependency".to_string(),
            "update".to_string(),
            chart_path.display().to_string(),
        ];
        let output = self.spawn(&args).await?;
        if !output.status.success() {
            return Err(ReleaseError::Helm(strip_error_prefix(&String::from_utf8_lossy(&output.stderr))));
        }
        Ok(())
    }
}

fn push_path(args: &mut Vec<String>, flag: &str, path: Option<&Path>) {
    if let Some(path) = path {
        args.push(flag.to_string());
        args.push(path.display().to_string());
    }
}

fn push_flag(args: &mut Vec<String>, flag: &str, enabled: bool) {
    if enabled {
        args.push(flag.to_string());
    }
}

fn push_postrender(args: &mut Vec<String>, postrender: Option<&PostRender>) {
    if let Some(postrender) = postrender {
        args.push("--post-renderer".to_string());
        args.push(postrender.binary_path.clone());
        for arg in &postrender.args {
            args.push("--post-renderer-args".to_string());
            args.push(arg.clone());
        }
    }
}

fn push_description(args: &mut Vec<String>, description: Option<&String>) {
    if let Some(description) = description {
        args.push("--description".to_string());
        args.push(description.clone());
    }
}

fn status_args(namespace: &str, name: &str) -> Vec<String> {
    vec![
        "status".to_string(),
        name.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ]
}

fn install_args(options: &InstallOptions, values: &Path) -> Vec<String> {
    let mut args = vec![
        "install".to_string(),
        options.name.clone(),
        options.chart.path.display().to_string(),
        "--namespace".to_string(),
        options.namespace.clone(),
        "--values".to_string(),
        values.display().to_string(),
        "--output".to_string(),
        "json".to_string(),
        "--timeout".to_string(),
        timeout_flag(options.timeout),
    ];
    push_flag(&mut args, "--wait", options.wait || options.atomic);
    push_flag(&mut args, "--wait-for-jobs", options.wait && options.wait_for_jobs);
    push_flag(&mut args, "--atomic", options.atomic);
    push_flag(&mut args, "--create-namespace", options.create_namespace);
    push_flag(&mut args, "--skip-crds", options.skip_crds);
    push_flag(&mut args, "--no-hooks", options.disable_webhooks);
    push_flag(&mut args, "--disable-openapi-validation", options.disable_openapi_validation);
    push_flag(&mut args, "--replace", options.replace);
    push_flag(&mut args, "--render-subchart-notes", options.render_subchart_notes);
    push_description(&mut args, options.description.as_ref());
    push_postrender(&mut args, options.postrender.as_ref());
    if let Some(flag) = options.dry_run.flag() {
        args.push(flag.to_string());
    }
    args
}

fn upgrade_args(options: &UpgradeOptions, values: &Path) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        options.name.clone(),
        options.chart.path.display().to_string(),
        "--namespace".to_string(),
        options.namespace.clone(),
        "--values".to_string(),
        values.display().to_string(),
        "--output".to_string(),
        "json".to_string(),
        "--timeout".to_string(),
        timeout_flag(options.timeout),
    ];
    push_flag(&mut args, "--wait", options.wait || options.atomic);
    push_flag(&mut args, "--wait-for-jobs", options.wait && options.wait_for_jobs);
    push_flag(&mut args, "--atomic", options.atomic);
    push_flag(&mut args, "--force", options.force);
    push_flag(&mut args, "--cleanup-on-fail", options.cleanup_on_fail);
    push_flag(&mut args, "--reset-values", options.reset_values);
    push_flag(&mut args, "--reuse-values", options.reuse_values);
    push_flag(&mut args, "--skip-crds", options.skip_crds);
    push_flag(&mut args, "--no-hooks", options.disable_webhooks);
    push_flag(&mut args, "--disable-openapi-validation", options.disable_openapi_validation);
    push_flag(&mut args, "--render-subchart-notes", options.render_subchart_notes);
    if options.max_history > 0 {
        args.push(format!("--history-max={}", options.max_history));
    }
    push_description(&mut args, options.description.as_ref());
    push_postrender(&mut args, options.postrender.as_ref());
    if let Some(flag) = options.dry_run.flag() {
        args.push(flag.to_string());
    }
    args
}

fn uninstall_args(options: &UninstallOptions) -> Vec<String> {
    let mut args = vec![
        "uninstall".to_string(),
        options.name.clone(),
        "--namespace".to_string(),
        options.namespace.clone(),
        "--timeout".to_string(),
        timeout_flag(options.timeout),
    ];
    push_flag(&mut args, "--wait", options.wait);
    push_flag(&mut args, "--no-hooks", options.disable_webhooks);
    push_flag(&mut args, "--keep-history", options.keep_history);
    push_description(&mut args, options.description.as_ref());
    args
}

fn template_args(options: &RenderOptions, values: &Path) -> Vec<String> {
    let mut args = vec![
        "template".to_string(),
        options.name.clone(),
        options.chart.path.display().to_string(),
        "--namespace".to_string(),
        options.namespace.clone(),
        "--values".to_string(),
        values.display().to_string(),
    ];
    push_flag(&mut args, "--include-crds", options.include_crds);
    push_flag(&mut args, "--skip-crds", options.skip_crds);
    push_flag(&mut args, "--is-upgrade", options.is_upgrade);
    push_flag(&mut args, "--validate", options.validate);
    push_flag(&mut args, "--skip-tests", options.skip_tests);
    push_flag(&mut args, "--create-namespace", options.create_namespace);
    push_flag(&mut args, "--no-hooks", options.disable_webhooks);
    push_flag(&mut args, "--render-subchart-notes", options.render_subchart_notes);
    if let Some(kube_version) = &options.kube_version {
        args.push("--kube-version".to_string());
        args.push(kube_version.clone());
    }
    for api_version in &options.api_versions {
        args.push("--api-versions".to_string());
        args.push(api_version.clone());
    }
    push_description(&mut args, options.description.as_ref());
    push_postrender(&mut args, options.postrender.as_ref());
    args
}

/// Write values to a temporary file that lives as long as the handle
fn values_file(values: &Values) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("helmform-values-")
        .suffix(".json")
        .tempfile()?;
    file.write_all(values.to_json()?.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn parse_release(stdout: &[u8]) -> Result<Release> {
    serde_json::from_slice(stdout)
        .map_err(|e| ReleaseError::Helm(format!("could not parse helm output: {}", e)))
}

fn strip_error_prefix(stderr: &str) -> String {
    let message = stderr.trim();
    message.strip_prefix("Error: ").unwrap_or(message).to_string()
}

/// Map helm's stderr to an error variant
fn classify_error(stderr: &str, name: &str, namespace: &str) -> ReleaseError {
    let message = strip_error_prefix(stderr);
    if message.contains("release: not found") {
        ReleaseError::not_found(name, namespace)
    } else if message.contains("Kubernetes cluster unreachable")
        || message.contains("is forbidden")
        || message.starts_with("the server")
    {
        ReleaseError::Api(message)
    } else {
        ReleaseError::Helm(message)
    }
}

/// `[ERROR]` lines of `helm lint` output
fn lint_messages(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("[ERROR]"))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::DryRunMode;
    use chrono::Duration;
    use tempfile::TempDir;

    fn chart() -> (TempDir, LoadedChart) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Chart.yaml"), "apiVersion: v2\nname: web\nversion: 1.0.0\n").unwrap();
        let chart = LoadedChart::load(dir.path()).unwrap();
        (dir, chart)
    }

    #[test]
    fn test_global_args() {
        let settings = HelmSettings {
            kubeconfig: Some(PathBuf::from("/tmp/kubeconfig")),
            kube_context: Some("staging".to_string()),
            debug: true,
            ..Default::default()
        };
        assert_eq!(
            settings.global_args(),
            vec!["--kubeconfig", "/tmp/kubeconfig", "--kube-context", "staging", "--burst-limit=100", "--debug"]
        );
    }

    #[test]
    fn test_install_args() {
        let (_dir, chart) = chart();
        let mut options = InstallOptions::new("web", "apps", chart).with_atomic(Duration::seconds(120));
        options.create_namespace = true;
        options.postrender = Some(PostRender {
            binary_path: "kustomize-wrapper".to_string(),
            args: vec!["--overlay".to_string(), "prod".to_string()],
        });
        options.dry_run = DryRunMode::Server;

        let args = install_args(&options, Path::new("/tmp/values.json"));
        assert_eq!(&args[..2], &["install", "web"]);
        assert!(args.windows(2).any(|w| w == ["--timeout", "120s"]));
        assert!(args.windows(2).any(|w| w == ["--values", "/tmp/values.json"]));
        assert!(args.contains(&"--atomic".to_string()));
        assert!(args.contains(&"--wait".to_string()));
        assert!(args.contains(&"--create-namespace".to_string()));
        assert!(args.windows(2).any(|w| w == ["--post-renderer-args", "prod"]));
        assert_eq!(args.last().map(String::as_str), Some("--dry-run=server"));
    }

    #[test]
    fn test_upgrade_args() {
        let (_dir, chart) = chart();
        let mut options = UpgradeOptions::new("web", "apps", chart).with_force();
        options.max_history = 5;
        options.reuse_values = true;
        options.wait = false;

        let args = upgrade_args(&options, Path::new("/tmp/values.json"));
        assert!(args.contains(&"--force".to_string()));
        assert!(args.contains(&"--reuse-values".to_string()));
        assert!(args.contains(&"--history-max=5".to_string()));
        assert!(!args.contains(&"--wait".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--dry-run")));
    }

    #[test]
    fn test_template_args() {
        let (_dir, chart) = chart();
        let mut options = RenderOptions::new("web", "apps", chart);
        options.include_crds = true;
        options.kube_version = Some("1.29.0".to_string());
        options.api_versions = vec!["monitoring.coreos.com/v1".to_string()];

        let args = template_args(&options, Path::new("/tmp/values.json"));
        assert_eq!(args[0], "template");
        assert!(args.contains(&"--include-crds".to_string()));
        assert!(args.windows(2).any(|w| w == ["--kube-version", "1.29.0"]));
        assert!(args.windows(2).any(|w| w == ["--api-versions", "monitoring.coreos.com/v1"]));
    }

    #[test]
    fn test_classify_error() {
        assert!(classify_error("Error: release: not found\n", "web", "apps").is_not_found());
        assert!(matches!(
            classify_error("Error: Kubernetes cluster unreachable: dial tcp", "web", "apps"),
            ReleaseError::Api(_)
        ));
        let err = classify_error("Error: UPGRADE FAILED: \"web\" has no deployed releases", "web", "apps");
        assert!(err.is_no_deployed_releases());
        assert_eq!(err.to_string(), "UPGRADE FAILED: \"web\" has no deployed releases");
    }

    #[test]
    fn test_lint_messages() {
        let out = "==> Linting ./web\n[INFO] Chart.yaml: icon is recommended\n[ERROR] templates/: parse error\n\nError: 1 chart(s) linted, 1 chart(s) failed\n";
        assert_eq!(lint_messages(out), vec!["[ERROR] templates/: parse error"]);
    }

    #[test]
    fn test_values_file_is_json() {
        let values = Values::from_yaml("password: hunter2").unwrap();
        let file = values_file(&values).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, r#"{"password":"hunter2"}"#);
    }

    #[cfg(unix)]
    fn fake_helm(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("helm");
        std::fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_with_fake_binary() {
        let dir = TempDir::new().unwrap();
        let binary = fake_helm(
            dir.path(),
            r#"for arg in "$@"; do
  if [ "$arg" = "missing" ]; then echo "Error: release: not found" >&2; exit 1; fi
done
echo '{"name":"web","namespace":"apps","version":2,"info":{"status":"deployed"},"chart":{"metadata":{"name":"web","version":"1.0.0"}},"config":null}'
"#,
        );
        let driver = HelmCliDriver::new(HelmSettings {
            binary,
            ..Default::default()
        });

        let release = driver.get("apps", "web").await.unwrap();
        assert_eq!(release.version, 2);
        assert_eq!(release.status(), ReleaseStatus::Deployed);

        assert!(!driver.exists("apps", "missing").await.unwrap());
    }
}
