//! Template command - render a chart through the `helm` binary

use clap::Args;
use console::style;
use helmform_provider::{Meta, ReleaseConfig, TemplateConfig, TemplateDataSource};

use super::resolve::{ChartArgs, RepositoryArgs};
use super::values::ValueArgs;
use crate::error::Result;

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    /// Release name
    pub name: String,

    #[command(flatten)]
    pub chart: ChartArgs,

    #[command(flatten)]
    pub values: ValueArgs,

    #[command(flatten)]
    pub repository: RepositoryArgs,

    /// Target namespace
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Only print these templates (paths relative to the chart, `*` allowed)
    #[arg(short = 's', long)]
    pub show_only: Vec<String>,

    /// Include CRDs from the chart's crds/ directory
    #[arg(long)]
    pub include_crds: bool,

    /// Drop test hooks from the output
    #[arg(long)]
    pub skip_tests: bool,

    /// Set .Release.IsUpgrade instead of .Release.IsInstall
    #[arg(long)]
    pub is_upgrade: bool,

    /// Validate the manifest against the cluster
    #[arg(long)]
    pub validate: bool,

    /// Kubernetes version used for Capabilities.KubeVersion
    #[arg(long)]
    pub kube_version: Option<String>,

    /// Extra API versions for Capabilities.APIVersions
    #[arg(short = 'a', long = "api-versions")]
    pub api_versions: Vec<String>,

    /// Vendor missing dependencies before rendering
    #[arg(long)]
    pub dependency_update: bool,

    /// Path to the kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub kube_context: Option<String>,

    /// Print the chart notes after the manifest
    #[arg(long)]
    pub show_notes: bool,
}

impl TemplateArgs {
    fn template_config(&self) -> Result<TemplateConfig> {
        let sources = self.values.sources()?;
        let chart = &self.chart;

        let mut release = ReleaseConfig::new(&self.name, &chart.chart).with_namespace(&self.namespace);
        release.repository = chart.repository.clone();
        release.version = chart.chart_version.clone();
        release.devel = chart.devel;
        release.verify = chart.verify;
        release.repository_username = chart.username.clone();
        release.repository_password = chart.password.clone();
        release.pass_credentials = chart.pass_credentials;
        release.dependency_update = self.dependency_update;
        release.values = sources.values;
        release.set = sources.set;
        release.set_sensitive = sources.set_sensitive;
        release.set_list = sources.set_list;

        let mut config = TemplateConfig::new(release);
        config.show_only = self.show_only.clone();
        config.include_crds = self.include_crds;
        config.skip_tests = self.skip_tests;
        config.is_upgrade = self.is_upgrade;
        config.validate = self.validate;
        config.kube_version = self.kube_version.clone();
        config.api_versions = self.api_versions.clone();
        Ok(config)
    }
}

pub async fn run(args: &TemplateArgs) -> Result<()> {
    let mut provider = args.repository.provider_config()?;
    if let Some(kubeconfig) = &args.kubeconfig {
        provider.kubernetes.config_path = Some(kubeconfig.clone());
    }
    if let Some(context) = &args.kube_context {
        provider.kubernetes.config_context = Some(context.clone());
    }

    let meta = Meta::configure(provider).await?;
    let config = args.template_config()?;
    let state = TemplateDataSource::new(&meta).read(&config).await?;

    tracing::info!("rendered {} templates for {}", state.manifests.len(), state.id);
    print!("{}", state.manifest);

    if args.show_notes && !state.notes.is_empty() {
        eprintln!();
        eprintln!("{}", style("NOTES:").cyan().bold());
        eprintln!("{}", state.notes);
    }
    Ok(())
}
