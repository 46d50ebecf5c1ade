//! Release drivers
//!
//! A driver performs the release actions themselves. Two are provided:
//! - **Helm**: shells out to the `helm` binary against a real cluster
//! - **Mock**: in-memory releases for tests, with operation counts and
//!   fault injection

mod helm;
mod mock;

pub use helm::{HelmCliDriver, HelmSettings};
pub use mock::{MockReleaseDriver, OperationCounts};

use async_trait::async_trait;
use helmform_core::{LoadedChart, Values};
use std::path::Path;

use crate::actions::{InstallOptions, RenderOptions, UninstallOptions, UpgradeOptions};
use crate::error::Result;
use crate::release::Release;

/// Performs release actions against a cluster
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ReleaseDriver: Send + Sync {
    /// Get the latest revision of a release
    async fn get(&self, namespace: &str, name: &str) -> Result<Release>;

    /// Install a chart as a new release
    ///
    /// A failure that still recorded a release returns
    /// `ReleaseError::ReleaseFailed` carrying that release.
    async fn install(&self, options: &InstallOptions) -> Result<Release>;

    /// Upgrade an existing release
    async fn upgrade(&self, options: &UpgradeOptions) -> Result<Release>;

    /// Uninstall a release
    async fn uninstall(&self, options: &UninstallOptions) -> Result<()>;

    /// Render a chart without installing it
    async fn render(&self, options: &RenderOptions) -> Result<Release>;

    /// Run the chart linter, failing with `ReleaseError::LintFailed`
    async fn lint(&self, chart: &LoadedChart, namespace: &str, values: &Values) -> Result<()>;

    /// Vendor the dependencies declared in `Chart.yaml` under `charts/`
    async fn dependency_update(&self, chart_path: &Path) -> Result<()>;

    /// Check if a release exists
    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.get(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
