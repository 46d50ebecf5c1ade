//! Helmform Release - release lifecycle on top of the Helm toolchain
//!
//! This crate provides:
//! - **Release Drivers**: install, upgrade, uninstall, render and lint through
//!   the `helm` binary, or in memory for tests
//! - **Manifest Normalization**: multi-document YAML to a stable JSON object,
//!   with secrets and sensitive literals redacted
//! - **Drift Planning**: dry-run based prediction of a release's computed
//!   attributes

pub mod actions;
pub mod diff;
pub mod driver;
pub mod error;
pub mod manifest;
pub mod release;

pub use actions::{DryRunMode, InstallOptions, PostRender, RenderOptions, UninstallOptions, UpgradeOptions};
pub use diff::{ChangeType, DiffResult, DriftRenderer, DryRun, PlanRequest, Planned, ReleasePlan, ResourceChange, diff_manifests};
pub use driver::{HelmCliDriver, HelmSettings, MockReleaseDriver, OperationCounts, ReleaseDriver};
pub use error::{ReleaseError, Result};
pub use manifest::{manifest_to_json, normalize, split_by_source, split_documents};
pub use release::{Hook, Release, ReleaseChart, ReleaseInfo, ReleaseStatus};
