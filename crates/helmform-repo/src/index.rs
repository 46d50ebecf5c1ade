//! Repository index types
//!
//! Helm repository `index.yaml` format

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constraint::{Constraint, parse_version};
use crate::error::{RepoError, Result};

/// Repository index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions by chart name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartVersion>>,
}

impl RepositoryIndex {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// All versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartVersion>> {
        self.entries.get(name)
    }

    /// Highest version of `name` satisfying `constraint`
    ///
    /// An empty constraint selects the latest stable version, or the latest
    /// version of any kind when `devel` is set. With `devel`, prereleases also
    /// satisfy non-empty constraints.
    pub fn find_best_match(&self, name: &str, constraint: &str, devel: bool) -> Result<&ChartVersion> {
        let versions = self
            .entries
            .get(name)
            .ok_or_else(|| RepoError::chart_not_found(name, constraint))?;

        let constraint = constraint.trim();
        let parsed = if constraint.is_empty() {
            None
        } else {
            Some(Constraint::parse(constraint)?)
        };

        versions
            .iter()
            .filter_map(|entry| entry.parsed_version().map(|v| (v, entry)))
            .filter(|(version, entry)| {
                if let Some(parsed) = &parsed {
                    // an exact string match always wins over semver rules
                    if entry.version == constraint {
                        return true;
                    }
                    if parsed.matches(version) {
                        return true;
                    }
                    devel && !version.pre.is_empty() && parsed.matches(&release_of(version))
                } else {
                    devel || version.pre.is_empty()
                }
            })
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, entry)| entry)
            .ok_or_else(|| RepoError::chart_not_found(name, constraint))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn add_entry(&mut self, entry: ChartVersion) {
        self.entries
            .entry(entry.name.clone())
            .or_default()
            .push(entry);
    }
}

fn release_of(version: &Version) -> Version {
    Version::new(version.major, version.minor, version.patch)
}

/// One chart version in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub api_version: Option<String>,

    /// Download URLs, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,
}

impl ChartVersion {
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    pub fn parsed_version(&self) -> Option<Version> {
        parse_version(&self.version)
    }

    /// Archive file name in the cache, `<name>-<version>.tgz`
    pub fn archive_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version)
    }
}
