//! Chart references
//!
//! A release names its chart with two free-form strings, `chart` and
//! `repository`. `ChartReference` classifies the pair once so later stages
//! never have to re-inspect the raw input.

use serde::{Deserialize, Serialize};
use url::Url;

/// URL scheme of OCI registry references
pub const OCI_SCHEME: &str = "oci://";

/// A classified `chart` + `repository` + `version` triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartReference {
    /// Chart name after alias joining (`alias/chart`, a path, a URL or an
    /// `oci://` reference)
    pub name: String,

    /// Repository URL, set only when `repository` was an absolute URL
    pub repository: Option<String>,

    /// Version constraint, if any
    pub version: Option<String>,

    pub is_oci: bool,
    pub is_local_path: bool,
    pub is_remote_archive_url: bool,
}

impl ChartReference {
    pub fn parse(chart: &str, repository: &str, version: &str) -> Self {
        let chart = chart.trim();
        let repository = repository.trim();
        let version = Some(version.trim().to_string()).filter(|v| !v.is_empty());

        if is_oci(chart) {
            return Self {
                name: chart.to_string(),
                repository: None,
                version,
                is_oci: true,
                is_local_path: false,
                is_remote_archive_url: false,
            };
        }

        if is_oci(repository) {
            return Self {
                name: format!("{}/{}", repository.trim_end_matches('/'), chart),
                repository: None,
                version,
                is_oci: true,
                is_local_path: false,
                is_remote_archive_url: false,
            };
        }

        let (repository_url, name) = resolve_chart_name(repository, chart);
        Self {
            is_local_path: looks_like_path(&name),
            is_remote_archive_url: is_http_url(&name),
            name,
            repository: repository_url,
            version,
            is_oci: false,
        }
    }

    /// Repository URL the chart should be fetched from, if any
    pub fn repository_url(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// Repository alias for `alias/chart` names without a repository URL
    pub fn alias(&self) -> Option<&str> {
        if self.repository.is_some() || self.is_oci || self.is_local_path || self.is_remote_archive_url {
            return None;
        }
        self.name.split_once('/').map(|(alias, _)| alias)
    }

    /// Chart name without any alias prefix
    pub fn chart_name(&self) -> &str {
        match self.alias() {
            Some(alias) => &self.name[alias.len() + 1..],
            None => self.name.rsplit('/').next().unwrap_or(&self.name),
        }
    }

    /// Version constraint, `""` meaning latest
    pub fn version_constraint(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

/// Split a repository/chart pair into `(repository_url, chart_name)`
///
/// A repository that parses as an absolute URL is kept as the repository URL
/// and the chart name is left alone. Otherwise a non-empty repository is an
/// alias, joined as `alias/chart` unless the chart already contains a `/`.
pub fn resolve_chart_name(repository: &str, chart: &str) -> (Option<String>, String) {
    if is_absolute_url(repository) {
        return (Some(repository.to_string()), chart.to_string());
    }

    if !chart.contains('/') && !repository.is_empty() {
        return (None, format!("{}/{}", repository, chart));
    }

    (None, chart.to_string())
}

pub fn is_oci(s: &str) -> bool {
    s.starts_with(OCI_SCHEME)
}

fn is_absolute_url(s: &str) -> bool {
    match Url::parse(s) {
        // a Windows drive letter parses as a one-letter scheme
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Absolute or `.`-relative paths are always treated as local paths
pub fn looks_like_path(s: &str) -> bool {
    s.starts_with('.') || std::path::Path::new(s).is_absolute() || s.starts_with('/')
}
