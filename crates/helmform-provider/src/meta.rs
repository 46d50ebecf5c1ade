//! Shared provider state handed to every resource operation

use helmform_release::{HelmCliDriver, ReleaseDriver};
use helmform_repo::{ChartResolver, RemoteFetcher, ResolverSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::config::{ProviderConfig, write_kubeconfig};
use crate::error::{ProviderError, Result};

/// Configured provider: chart resolver, release driver and settings
pub struct Meta {
    config: ProviderConfig,
    resolver: ChartResolver,
    driver: Arc<dyn ReleaseDriver>,
    /// Kept alive for as long as the driver may read it
    _kubeconfig: Option<NamedTempFile>,
}

impl Meta {
    /// Assemble from already built parts
    pub fn new(config: ProviderConfig, resolver: ChartResolver, driver: Arc<dyn ReleaseDriver>) -> Self {
        Self {
            config,
            resolver,
            driver,
            _kubeconfig: None,
        }
    }

    /// Configure the provider against the `helm` binary
    pub async fn configure(config: ProviderConfig) -> Result<Self> {
        let config = config.with_env_defaults()?;

        let kubeconfig = match config.kubernetes.kubeconfig()? {
            Some(kubeconfig) => {
                let client = kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &config.kubernetes.options()).await?;
                tracing::info!("helm: using cluster {}", client.cluster_url);
                Some(write_kubeconfig(&kubeconfig, None)?)
            }
            None => {
                tracing::debug!("helm: no kubernetes settings, using helm defaults");
                None
            }
        };

        let settings = ResolverSettings::new(
            required(config.repository_config_path.clone(), "repository_config_path")?,
            required(config.repository_cache.clone(), "repository_cache")?,
        );
        let fetcher = RemoteFetcher::new(config.registry_logins()?);
        let resolver = ChartResolver::new(settings, Arc::new(fetcher));

        let helm = config.helm_settings(kubeconfig.as_ref().map(|f| f.path().to_path_buf()));
        tracing::debug!(
            "helm: driver={} burst_limit={} debug={}",
            helm.storage_driver,
            helm.burst_limit,
            helm.debug
        );
        let driver: Arc<dyn ReleaseDriver> = Arc::new(HelmCliDriver::new(helm));

        Ok(Self {
            config,
            resolver,
            driver,
            _kubeconfig: kubeconfig,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ChartResolver {
        &self.resolver
    }

    pub fn driver(&self) -> &dyn ReleaseDriver {
        self.driver.as_ref()
    }

    pub fn manifest_enabled(&self) -> bool {
        self.config.experiments.manifest
    }
}

fn required(path: Option<PathBuf>, field: &str) -> Result<PathBuf> {
    path.ok_or_else(|| ProviderError::InvalidConfig(format!("{field} could not be determined")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KubernetesConfig;
    use helmform_release::MockReleaseDriver;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_configure_with_inline_cluster() {
        let temp = TempDir::new().unwrap();
        let config = ProviderConfig {
            kubernetes: KubernetesConfig {
                host: Some("https://203.0.113.10".to_string()),
                token: Some("abc".to_string()),
                ..Default::default()
            },
            repository_config_path: Some(temp.path().join("repositories.yaml")),
            repository_cache: Some(temp.path().join("cache")),
            registry_config_path: Some(temp.path().join("registry.json")),
            ..Default::default()
        };

        let meta = Meta::configure(config).await.unwrap();
        assert_eq!(
            meta.resolver().settings().repository_cache,
            temp.path().join("cache")
        );
        assert!(meta._kubeconfig.as_ref().is_some_and(|f| f.path().exists()));
        assert!(!meta.manifest_enabled());
    }

    #[test]
    fn test_new_with_mock_driver() {
        let temp = TempDir::new().unwrap();
        let resolver = ChartResolver::new(
            ResolverSettings::new(temp.path().join("repositories.yaml"), temp.path().join("cache")),
            Arc::new(RemoteFetcher::default()),
        );
        let mut config = ProviderConfig::default();
        config.experiments.manifest = true;

        let meta = Meta::new(config, resolver, Arc::new(MockReleaseDriver::new()));
        assert!(meta.manifest_enabled());
    }
}
