//! Provider configuration
//!
//! The configuration is read once at the provider boundary. Unset fields fall
//! back to the `HELM_*` and `KUBE_*` environment variables, then to the
//! platform directories Helm itself uses.

use base64::{Engine, engine::general_purpose::STANDARD};
use helmform_release::HelmSettings;
use helmform_repo::{RegistryConfig, RepositoryFile, default_cache_dir};
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ProviderError, Result};

/// Cluster and user name of a kubeconfig built from inline settings
const INLINE_NAME: &str = "helmform";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kubernetes: KubernetesConfig,

    /// OCI registry logins
    pub registry: Vec<RegistryLogin>,

    pub debug: bool,
    pub plugins_path: Option<PathBuf>,
    pub registry_config_path: Option<PathBuf>,
    pub repository_config_path: Option<PathBuf>,
    pub repository_cache: Option<PathBuf>,
    pub helm_driver: Option<HelmDriver>,
    pub burst_limit: Option<u32>,
    pub experiments: Experiments,
}

/// Connection settings for the cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    pub config_path: Option<String>,
    pub config_paths: Vec<String>,
    pub config_context: Option<String>,
    pub host: Option<String>,
    pub token: Option<String>,
    pub insecure: bool,
    /// PEM encoded
    pub cluster_ca_certificate: Option<String>,
    /// PEM encoded
    pub client_certificate: Option<String>,
    /// PEM encoded
    pub client_key: Option<String>,
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryLogin {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experiments {
    /// Compute the `manifest` attribute of releases
    pub manifest: bool,
}

/// Release storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelmDriver {
    Configmap,
    #[default]
    Secret,
    Memory,
}

impl HelmDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelmDriver::Configmap => "configmap",
            HelmDriver::Secret => "secret",
            HelmDriver::Memory => "memory",
        }
    }
}

impl FromStr for HelmDriver {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "configmap" | "configmaps" => Ok(HelmDriver::Configmap),
            "secret" | "secrets" | "" => Ok(HelmDriver::Secret),
            "memory" => Ok(HelmDriver::Memory),
            other => Err(ProviderError::InvalidConfig(format!(
                "helm_driver must be one of configmap, secret or memory, got {other:?}"
            ))),
        }
    }
}

impl ProviderConfig {
    /// Fill unset fields from the process environment
    pub fn with_env_defaults(self) -> Result<Self> {
        self.apply_defaults(|key| std::env::var(key).ok())
    }

    /// Fill unset fields from `env`, then from the platform directories
    pub fn apply_defaults(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        if self.helm_driver.is_none() {
            self.helm_driver = env("HELM_DRIVER").map(|v| v.parse()).transpose()?;
        }
        if !self.debug {
            self.debug = env("HELM_DEBUG").is_some_and(|v| is_truthy(&v));
        }
        if self.burst_limit.is_none() {
            self.burst_limit = env("HELM_BURST_LIMIT").and_then(|v| v.parse().ok());
        }

        self.plugins_path = self
            .plugins_path
            .or_else(|| path("HELM_PLUGINS"))
            .or_else(|| dirs::data_dir().map(|d| d.join("helm").join("plugins")));
        self.registry_config_path = self
            .registry_config_path
            .or_else(|| path("HELM_REGISTRY_CONFIG"))
            .or_else(|| dirs::config_dir().map(|d| d.join("helm").join("registry").join("config.json")));
        self.repository_config_path = self
            .repository_config_path
            .or_else(|| path("HELM_REPOSITORY_CONFIG"))
            .or_else(|| RepositoryFile::default_path().ok());
        self.repository_cache = self
            .repository_cache
            .or_else(|| path("HELM_REPOSITORY_CACHE"))
            .or_else(|| default_cache_dir().ok());

        self.kubernetes.apply_defaults(&env);
        Ok(self)
    }

    pub fn storage_driver(&self) -> HelmDriver {
        self.helm_driver.unwrap_or_default()
    }

    /// Registry config file with the configured logins recorded by host
    pub fn registry_logins(&self) -> Result<RegistryConfig> {
        let mut logins = match &self.registry_config_path {
            Some(path) => RegistryConfig::load(path)?,
            None => RegistryConfig::default(),
        };
        for registry in &self.registry {
            let host = registry.host()?;
            tracing::debug!("helm: registry login for {}", host);
            logins.login(host, &registry.username, &registry.password);
        }
        Ok(logins)
    }

    /// Settings for the `helm` binary driver
    pub fn helm_settings(&self, kubeconfig: Option<PathBuf>) -> HelmSettings {
        HelmSettings {
            kubeconfig,
            kube_context: self.kubernetes.config_context.clone(),
            storage_driver: self.storage_driver().as_str().to_string(),
            debug: self.debug,
            burst_limit: self.burst_limit.unwrap_or(100),
            plugins_path: self.plugins_path.clone(),
            registry_config: self.registry_config_path.clone(),
            repository_config: self.repository_config_path.clone(),
            repository_cache: self.repository_cache.clone(),
            ..HelmSettings::default()
        }
    }
}

impl KubernetesConfig {
    fn apply_defaults(&mut self, env: &impl Fn(&str) -> Option<String>) {
        let fill = |field: &mut Option<String>, key: &str| {
            if field.is_none() {
                *field = env(key).filter(|v| !v.is_empty());
            }
        };
        fill(&mut self.config_path, "KUBE_CONFIG_PATH");
        fill(&mut self.config_context, "KUBE_CTX");
        fill(&mut self.host, "KUBE_HOST");
        fill(&mut self.token, "KUBE_TOKEN");
        fill(&mut self.cluster_ca_certificate, "KUBE_CLUSTER_CA_CERT_DATA");
        fill(&mut self.client_certificate, "KUBE_CLIENT_CERT_DATA");
        fill(&mut self.client_key, "KUBE_CLIENT_KEY_DATA");
        fill(&mut self.proxy_url, "KUBE_PROXY_URL");

        if self.config_paths.is_empty()
            && let Some(paths) = env("KUBE_CONFIG_PATHS")
        {
            self.config_paths = std::env::split_paths(&OsString::from(paths))
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
        }
        if !self.insecure {
            self.insecure = env("KUBE_INSECURE").is_some_and(|v| is_truthy(&v));
        }
    }

    /// Kubeconfig files in load order, with `~` expanded
    pub fn paths(&self) -> Vec<PathBuf> {
        self.config_path
            .iter()
            .chain(self.config_paths.iter())
            .map(|p| expand_home(p))
            .collect()
    }

    /// Merged kubeconfig files, or one built from the inline settings.
    ///
    /// Returns `None` when nothing is configured, leaving Helm's own
    /// discovery in charge.
    pub fn kubeconfig(&self) -> Result<Option<Kubeconfig>> {
        let paths = self.paths();
        if !paths.is_empty() {
            let mut merged: Option<Kubeconfig> = None;
            for path in &paths {
                let next = Kubeconfig::read_from(path)?;
                merged = Some(match merged {
                    Some(current) => current.merge(next)?,
                    None => next,
                });
            }
            return Ok(merged);
        }

        match &self.host {
            Some(host) => self.inline_kubeconfig(host).map(Some),
            None => Ok(None),
        }
    }

    fn inline_kubeconfig(&self, host: &str) -> Result<Kubeconfig> {
        let mut cluster = serde_json::Map::new();
        cluster.insert("server".into(), host.into());
        if self.insecure {
            cluster.insert("insecure-skip-tls-verify".into(), true.into());
        }
        if let Some(ca) = &self.cluster_ca_certificate {
            cluster.insert("certificate-authority-data".into(), STANDARD.encode(ca).into());
        }
        if let Some(proxy) = &self.proxy_url {
            cluster.insert("proxy-url".into(), proxy.as_str().into());
        }

        let mut user = serde_json::Map::new();
        if let Some(token) = &self.token {
            user.insert("token".into(), token.as_str().into());
        }
        if let Some(cert) = &self.client_certificate {
            user.insert("client-certificate-data".into(), STANDARD.encode(cert).into());
        }
        if let Some(key) = &self.client_key {
            user.insert("client-key-data".into(), STANDARD.encode(key).into());
        }

        let context = self.config_context.as_deref().unwrap_or(INLINE_NAME);
        let document = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{ "name": INLINE_NAME, "cluster": cluster }],
            "users": [{ "name": INLINE_NAME, "user": user }],
            "contexts": [{ "name": context, "context": { "cluster": INLINE_NAME, "user": INLINE_NAME } }],
            "current-context": context,
        });
        Ok(serde_json::from_value(document)?)
    }

    pub fn options(&self) -> KubeConfigOptions {
        KubeConfigOptions {
            context: self.config_context.clone(),
            ..Default::default()
        }
    }

    /// Client configuration for the selected context
    pub async fn client_config(&self) -> Result<Option<kube::Config>> {
        let Some(kubeconfig) = self.kubeconfig()? else {
            return Ok(None);
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &self.options()).await?;
        Ok(Some(config))
    }
}

impl RegistryLogin {
    /// Registry host the login applies to
    pub fn host(&self) -> Result<&str> {
        let rest = ["oci://", "https://", "http://"]
            .iter()
            .find_map(|scheme| self.url.strip_prefix(scheme))
            .unwrap_or(&self.url);
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(ProviderError::InvalidConfig(format!(
                "registry url {:?} has no host",
                self.url
            )));
        }
        Ok(host)
    }
}

/// Write a kubeconfig where the `helm` binary can read it
pub fn write_kubeconfig(kubeconfig: &Kubeconfig, dir: Option<&Path>) -> Result<tempfile::NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("helmform-kubeconfig-").suffix(".yaml");
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    std::fs::write(file.path(), serde_yaml::to_string(kubeconfig)?)?;
    Ok(file)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}
