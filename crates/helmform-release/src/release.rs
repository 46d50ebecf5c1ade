//! Release types
//!
//! The shape follows the JSON that `helm ... --output json` prints, so the
//! same type serves the in-memory driver and the `helm` binary driver.

use chrono::{DateTime, Utc};
use helmform_core::{ChartMetadata, Values};
use serde::{Deserialize, Serialize};

/// A release as recorded by the cluster-side storage driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Revision number (1-indexed, increments with each upgrade)
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub info: ReleaseInfo,

    #[serde(default)]
    pub chart: ReleaseChart,

    /// User-supplied values (not merged with chart defaults)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub config: Values,

    /// Rendered manifest, hooks excluded
    #[serde(default)]
    pub manifest: String,

    #[serde(default)]
    pub hooks: Vec<Hook>,
}

impl Release {
    pub fn status(&self) -> ReleaseStatus {
        self.info.status
    }

    pub fn chart_name(&self) -> &str {
        &self.chart.metadata.name
    }

    pub fn chart_version(&self) -> &str {
        &self.chart.metadata.version
    }

    pub fn app_version(&self) -> Option<&str> {
        self.chart.metadata.app_version.as_deref()
    }

    pub fn notes(&self) -> &str {
        &self.info.notes
    }

    /// A release left behind by a failed or interrupted install
    pub fn needs_replacement(&self) -> bool {
        matches!(
            self.info.status,
            ReleaseStatus::Failed | ReleaseStatus::PendingInstall
        )
    }

    /// Hooks that only run on `helm test`
    pub fn test_hooks(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter().filter(|h| h.is_test())
    }
}

// Helm prints `"config": null` for releases installed without values
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Values, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => Values::new(),
        Some(other) => Values(other),
    })
}

/// Release bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub first_deployed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_deployed: Option<DateTime<Utc>>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: ReleaseStatus,

    #[serde(default)]
    pub notes: String,
}

/// Chart a release was installed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseChart {
    #[serde(default)]
    pub metadata: ChartMetadata,
}

impl From<ChartMetadata> for ReleaseChart {
    fn from(metadata: ChartMetadata) -> Self {
        Self { metadata }
    }
}

/// Release status as reported by Helm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    /// Check if this is a pending (transitional) state
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback | Self::Uninstalling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Uninstalled => "uninstalled",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Uninstalling => "uninstalling",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered hook resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub name: String,

    #[serde(default)]
    pub kind: String,

    /// Template path, `<chart>/templates/...`
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub manifest: String,

    #[serde(default)]
    pub events: Vec<String>,
}

impl Hook {
    pub fn is_test(&self) -> bool {
        self.events.iter().any(|e| e == "test" || e == "test-success")
    }
}
