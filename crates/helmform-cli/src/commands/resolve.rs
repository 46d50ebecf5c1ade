//! Resolve command - bring a chart onto the local filesystem

use clap::Args;
use console::style;
use helmform_core::ChartReference;
use helmform_provider::ProviderConfig;
use helmform_repo::{ChartResolver, RemoteFetcher, ResolveOptions, ResolverSettings};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{CliError, Result};

#[derive(Args, Debug, Default, Clone)]
pub struct RepositoryArgs {
    /// Path to the repositories file (defaults to HELM_REPOSITORY_CONFIG)
    #[arg(long)]
    pub repository_config: Option<PathBuf>,

    /// Path to the repository cache (defaults to HELM_REPOSITORY_CACHE)
    #[arg(long)]
    pub repository_cache: Option<PathBuf>,

    /// Path to the registry config (defaults to HELM_REGISTRY_CONFIG)
    #[arg(long)]
    pub registry_config: Option<PathBuf>,
}

impl RepositoryArgs {
    /// Provider configuration with these paths, the rest from the environment
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let config = ProviderConfig {
            repository_config_path: self.repository_config.clone(),
            repository_cache: self.repository_cache.clone(),
            registry_config_path: self.registry_config.clone(),
            ..Default::default()
        };
        Ok(config.with_env_defaults()?)
    }

    pub fn resolver(&self) -> Result<ChartResolver> {
        let config = self.provider_config()?;
        let repository_config = config.repository_config_path.clone().ok_or_else(|| {
            CliError::usage("could not determine the repositories file", "pass --repository-config")
        })?;
        let repository_cache = config.repository_cache.clone().ok_or_else(|| {
            CliError::usage("could not determine the repository cache", "pass --repository-cache")
        })?;

        let fetcher = RemoteFetcher::new(config.registry_logins()?);
        Ok(ChartResolver::new(
            ResolverSettings::new(repository_config, repository_cache),
            Arc::new(fetcher),
        ))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ChartArgs {
    /// Chart name, local path, archive URL or oci:// reference
    pub chart: String,

    /// Repository URL or alias
    #[arg(long, default_value = "")]
    pub repository: String,

    /// Version constraint (latest when empty)
    #[arg(long = "version", default_value = "")]
    pub chart_version: String,

    /// Allow prerelease versions
    #[arg(long)]
    pub devel: bool,

    /// Check the archive against its provenance file
    #[arg(long)]
    pub verify: bool,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Send credentials to every domain, not only the repository's
    #[arg(long)]
    pub pass_credentials: bool,
}

impl ChartArgs {
    pub fn reference(&self) -> ChartReference {
        ChartReference::parse(&self.chart, &self.repository, &self.chart_version)
    }

    pub fn options(&self) -> ResolveOptions {
        ResolveOptions {
            verify: self.verify,
            devel: self.devel,
            username: self.username.clone(),
            password: self.password.clone(),
            pass_credentials: self.pass_credentials,
            ..Default::default()
        }
    }
}

pub async fn run(chart: &ChartArgs, repository: &RepositoryArgs, json: bool) -> Result<()> {
    let resolver = repository.resolver()?;
    let reference = chart.reference();
    tracing::debug!("resolving {:?}", reference);

    let resolved = resolver.load(&reference, &chart.options()).await?;
    let metadata = &resolved.chart.metadata;

    if json {
        let output = serde_json::json!({
            "path": resolved.path,
            "name": metadata.name,
            "version": metadata.version,
            "appVersion": metadata.app_version,
        });
        println!("{}", serde_json::to_string_pretty(&output).map_err(|e| CliError::Other {
            message: e.to_string(),
        })?);
        return Ok(());
    }

    eprintln!(
        "{} {} {}",
        style("Resolved").green().bold(),
        metadata.name,
        style(&metadata.version).dim()
    );
    if metadata.deprecated {
        eprintln!("{} this chart is deprecated", style("WARNING").yellow().bold());
    }
    println!("{}", resolved.path.display());
    Ok(())
}
