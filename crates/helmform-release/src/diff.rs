//! Drift planning
//!
//! Before an apply, the planned state of a release is predicted with a
//! server-validated dry-run. The predicted manifest is normalized to JSON and
//! redacted, so that it can be compared with what was recorded last time.

use helmform_core::ChartMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;

use crate::actions::{DryRunMode, InstallOptions, UpgradeOptions};
use crate::driver::ReleaseDriver;
use crate::error::Result;
use crate::manifest::normalize;
use crate::release::ReleaseStatus;

/// A planned attribute value, or one only known after apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned<T> {
    Known(T),
    Unknown,
}

impl<T> Planned<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Planned::Known(_))
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Planned::Known(value) => Some(value),
            Planned::Unknown => None,
        }
    }
}

/// Dry-run used to predict the manifest
#[derive(Debug, Clone)]
pub enum DryRun {
    /// No release exists yet
    Install(InstallOptions),
    /// A release exists and would be upgraded
    Upgrade(UpgradeOptions),
}

impl DryRun {
    fn metadata(&self) -> &ChartMetadata {
        match self {
            DryRun::Install(options) => &options.chart.metadata,
            DryRun::Upgrade(options) => &options.chart.metadata,
        }
    }
}

/// Inputs of a plan
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// `None` when the chart metadata could not be read
    pub dry_run: Option<DryRun>,

    /// Chart, repository, version, values or an override changed
    pub inputs_changed: bool,

    /// Compute the manifest attribute
    pub manifest_enabled: bool,

    /// Raw `set_sensitive` values to redact from the manifest
    pub sensitive_literals: Vec<String>,
}

/// Planned computed attributes of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePlan {
    pub status: Planned<ReleaseStatus>,
    pub version: Planned<String>,
    /// Metadata must be recomputed after apply
    pub metadata_unknown: bool,
    /// `None` when the manifest is not computed at all
    pub manifest: Option<Planned<String>>,
}

impl ReleasePlan {
    fn unknown(manifest_enabled: bool) -> Self {
        Self {
            status: Planned::Known(ReleaseStatus::Deployed),
            version: Planned::Unknown,
            metadata_unknown: true,
            manifest: manifest_enabled.then_some(Planned::Unknown),
        }
    }
}

/// Predicts the state of a release through dry-runs
pub struct DriftRenderer<'a> {
    driver: &'a dyn ReleaseDriver,
}

impl<'a> DriftRenderer<'a> {
    pub fn new(driver: &'a dyn ReleaseDriver) -> Self {
        Self { driver }
    }

    pub async fn plan(&self, request: PlanRequest) -> Result<ReleasePlan> {
        let Some(dry_run) = request.dry_run else {
            tracing::debug!("chart metadata unreadable, planning version as unknown");
            return Ok(ReleasePlan::unknown(request.manifest_enabled));
        };

        let chart_version = dry_run.metadata().version.clone();
        let mut plan = ReleasePlan {
            status: Planned::Known(ReleaseStatus::Deployed),
            version: if chart_version.is_empty() {
                Planned::Unknown
            } else {
                Planned::Known(chart_version)
            },
            metadata_unknown: request.inputs_changed,
            manifest: None,
        };

        if !request.manifest_enabled {
            return Ok(plan);
        }

        let rendered = match dry_run {
            DryRun::Install(options) => {
                self.driver
                    .install(&options.dry_run(DryRunMode::Server))
                    .await
            }
            DryRun::Upgrade(options) => {
                self.driver
                    .upgrade(&options.dry_run(DryRunMode::Server))
                    .await
            }
        };

        match rendered {
            Ok(release) => {
                let manifest = normalize(&release.manifest, &request.sensitive_literals)?;
                plan.manifest = Some(Planned::Known(manifest));
                Ok(plan)
            }
            Err(e) if e.is_no_deployed_releases() => {
                tracing::debug!("release has no deployed revision, planning as a fresh install");
                Ok(ReleasePlan::unknown(true))
            }
            Err(e) => Err(e),
        }
    }
}

/// Compare two normalized JSON manifests
pub fn diff_manifests(old: &str, new: &str) -> Result<DiffResult> {
    let old_resources = parse_normalized(old)?;
    let new_resources = parse_normalized(new)?;
    let mut changes = Vec::new();

    for (key, new_value) in &new_resources {
        match old_resources.get(key) {
            Some(old_value) if old_value != new_value => changes.push(ResourceChange {
                resource: key.clone(),
                change_type: ChangeType::Modified,
                diff: text_diff(&pretty(old_value)?, &pretty(new_value)?),
            }),
            None => changes.push(ResourceChange {
                resource: key.clone(),
                change_type: ChangeType::Added,
                diff: text_diff("", &pretty(new_value)?),
            }),
            _ => {}
        }
    }

    for (key, old_value) in &old_resources {
        if !new_resources.contains_key(key) {
            changes.push(ResourceChange {
                resource: key.clone(),
                change_type: ChangeType::Removed,
                diff: text_diff(&pretty(old_value)?, ""),
            });
        }
    }

    Ok(DiffResult { changes })
}

fn parse_normalized(json: &str) -> Result<BTreeMap<String, JsonValue>> {
    if json.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(json)?)
}

fn pretty(value: &JsonValue) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn text_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let prefix = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push_str(prefix);
        output.push_str(change.value().trim_end());
        output.push('\n');
    }

    output
}

/// Result of comparing two manifests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub changes: Vec<ResourceChange>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    fn count(&self, change_type: ChangeType) -> usize {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .count()
    }

    /// Generate a human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for change_type in [ChangeType::Added, ChangeType::Modified, ChangeType::Removed] {
            let count = self.count(change_type);
            if count > 0 {
                parts.push(format!("{} {}", count, change_type));
            }
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// A change to a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Normalized resource key, `kind[.group]/version/namespace/name`
    pub resource: String,
    pub change_type: ChangeType,
    /// Line diff of the pretty-printed resource
    pub diff: String,
}

/// Type of resource change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
        }
    }
}
