//! Chart metadata loading
//!
//! Only the parts of a chart that the release lifecycle inspects are loaded
//! here: `Chart.yaml`, the default values, the raw CRD files and the names of
//! bundled subcharts. Template rendering stays with the Helm toolchain.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::archive::{is_archive, read_archive, read_archive_file};
use crate::error::{CoreError, Result};
use crate::values::Values;

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,

    pub name: String,

    /// SemVer 2 version string
    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// `application` (default) or `library`
    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub kube_version: Option<String>,

    #[serde(default)]
    pub home: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,

    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl ChartMetadata {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check the fields Helm refuses to load a chart without
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("chart.metadata.name is required".to_string());
        }
        if self.name.contains('/') || self.name.contains('\\') {
            return Err(format!("chart.metadata.name {:?} cannot contain a path separator", self.name));
        }
        if self.version.trim().is_empty() {
            return Err("chart.metadata.version is required".to_string());
        }
        if semver::Version::parse(self.version.trim_start_matches('v')).is_err() {
            return Err(format!("chart.metadata.version {:?} is invalid", self.version));
        }
        Ok(())
    }
}

/// A `dependencies` entry of `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub condition: Option<String>,

    #[serde(default)]
    pub alias: Option<String>,
}

/// A raw file shipped with a chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartFile {
    /// Path relative to the chart root
    pub name: String,
    pub data: Vec<u8>,
}

impl ChartFile {
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Chart loaded from a directory or a packaged archive
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub metadata: ChartMetadata,

    /// Default values from `values.yaml`
    pub values: Values,

    /// Files under `crds/`, sorted by name
    pub crds: Vec<ChartFile>,

    /// Paths of files under `templates/`, sorted
    pub templates: Vec<String>,

    /// Chart names of bundled subcharts under `charts/`
    pub subcharts: Vec<String>,

    /// Where the chart was loaded from
    pub path: PathBuf,
}

impl LoadedChart {
    /// Load a chart from a directory or a `.tgz`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(invalid_chart(path, "path does not exist"));
        }

        let files = if is_archive(path) {
            read_archive_file(path)?
        } else if path.is_dir() {
            read_dir_files(path)?
        } else {
            return Err(invalid_chart(path, "not a chart directory or archive"));
        };

        let chart = Self::from_files(path, &files)?;
        if chart.metadata.deprecated {
            tracing::warn!("chart {} {} is deprecated", chart.metadata.name, chart.metadata.version);
        }
        Ok(chart)
    }

    /// Build a chart from its file map (paths relative to the chart root)
    pub fn from_files(path: &Path, files: &BTreeMap<String, Vec<u8>>) -> Result<Self> {
        let chart_yaml = files
            .get("Chart.yaml")
            .ok_or_else(|| invalid_chart(path, "Chart.yaml file is missing"))?;
        let metadata = ChartMetadata::from_yaml(&String::from_utf8_lossy(chart_yaml))
            .map_err(|e| invalid_chart(path, e.to_string()))?;
        metadata.validate().map_err(|message| invalid_chart(path, message))?;

        let values = match files.get("values.yaml") {
            Some(data) => Values::from_yaml(&String::from_utf8_lossy(data))?,
            None => Values::new(),
        };

        let crds = files
            .iter()
            .filter(|(name, _)| name.starts_with("crds/"))
            .map(|(name, data)| ChartFile {
                name: name.clone(),
                data: data.clone(),
            })
            .collect();

        let templates = files
            .keys()
            .filter(|name| name.starts_with("templates/"))
            .cloned()
            .collect();

        Ok(Self {
            metadata,
            values,
            crds,
            templates,
            subcharts: subchart_names(files)?,
            path: path.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Only application charts can be installed
    pub fn check_installable(&self) -> Result<()> {
        match self.metadata.chart_type.as_deref() {
            None | Some("") | Some("application") => Ok(()),
            Some(kind) => Err(CoreError::NotInstallable {
                kind: kind.to_string(),
            }),
        }
    }

    /// Dependencies declared in `Chart.yaml` with no matching chart under
    /// `charts/`
    pub fn missing_dependencies(&self) -> Vec<String> {
        self.metadata
            .dependencies
            .iter()
            .filter(|dep| !self.subcharts.iter().any(|name| name == &dep.name))
            .map(|dep| dep.name.clone())
            .collect()
    }
}

fn invalid_chart(path: &Path, message: impl Into<String>) -> CoreError {
    CoreError::InvalidChart {
        path: path.display().to_string(),
        message: message.into(),
    }
}

fn read_dir_files(root: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative.to_string_lossy().replace('\\', "/");
        files.insert(name, std::fs::read(entry.path())?);
    }
    Ok(files)
}

/// Names of the subcharts bundled under `charts/`
///
/// Both unpacked subchart directories (`charts/<dir>/Chart.yaml`) and
/// packaged ones (`charts/<name>.tgz`) count.
fn subchart_names(files: &BTreeMap<String, Vec<u8>>) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for (name, data) in files {
        let Some(rest) = name.strip_prefix("charts/") else {
            continue;
        };

        let chart_yaml = match rest.split_once('/') {
            Some((_, "Chart.yaml")) => Some(data.clone()),
            Some(_) => None,
            None if is_archive(Path::new(rest)) => read_archive(data)?.remove("Chart.yaml"),
            None => None,
        };

        if let Some(chart_yaml) = chart_yaml {
            let metadata = ChartMetadata::from_yaml(&String::from_utf8_lossy(&chart_yaml))?;
            names.push(metadata.name);
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::create_archive;
    use tempfile::TempDir;

    fn write(root: &Path, name: &str, content: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn demo_chart() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Chart.yaml",
            r#"
apiVersion: v2
name: demo
version: 1.2.3
appVersion: "2.0"
dependencies:
  - name: redis
    version: 17.x
    repository: https://charts.bitnami.com/bitnami
  - name: postgresql
    version: 12.x
    repository: https://charts.bitnami.com/bitnami
"#,
        );
        write(dir.path(), "values.yaml", "replicas: 2\n");
        write(dir.path(), "templates/deploy.yaml", "kind: Deployment\n");
        write(dir.path(), "crds/widget.yaml", "kind: CustomResourceDefinition\n");
        write(dir.path(), "charts/redis/Chart.yaml", "apiVersion: v2\nname: redis\nversion: 17.0.0\n");
        dir
    }

    #[test]
    fn test_load_directory() {
        let dir = demo_chart();
        let chart = LoadedChart::load(dir.path()).unwrap();

        assert_eq!(chart.name(), "demo");
        assert_eq!(chart.version(), "1.2.3");
        assert_eq!(chart.metadata.app_version.as_deref(), Some("2.0"));
        assert_eq!(chart.values.get("replicas").unwrap(), 2);
        assert_eq!(chart.crds.len(), 1);
        assert_eq!(chart.crds[0].name, "crds/widget.yaml");
        assert_eq!(chart.templates, vec!["templates/deploy.yaml".to_string()]);
        assert_eq!(chart.subcharts, vec!["redis".to_string()]);
        assert_eq!(chart.missing_dependencies(), vec!["postgresql".to_string()]);
        chart.check_installable().unwrap();
    }

    #[test]
    fn test_load_archive() {
        let dir = demo_chart();
        let out = TempDir::new().unwrap();
        let archive = create_archive(dir.path(), "demo", &out.path().join("demo-1.2.3.tgz")).unwrap();

        let chart = LoadedChart::load(&archive).unwrap();
        assert_eq!(chart.name(), "demo");
        assert_eq!(chart.subcharts, vec!["redis".to_string()]);
        assert_eq!(chart.path, archive);
    }

    #[test]
    fn test_packaged_subchart() {
        let dir = demo_chart();
        let sub = TempDir::new().unwrap();
        write(sub.path(), "Chart.yaml", "apiVersion: v2\nname: postgresql\nversion: 12.1.0\n");
        std::fs::create_dir_all(dir.path().join("charts")).unwrap();
        create_archive(sub.path(), "postgresql", &dir.path().join("charts/postgresql-12.1.0.tgz")).unwrap();

        let chart = LoadedChart::load(dir.path()).unwrap();
        assert_eq!(chart.subcharts, vec!["postgresql".to_string(), "redis".to_string()]);
        assert!(chart.missing_dependencies().is_empty());
    }

    #[test]
    fn test_library_not_installable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Chart.yaml", "apiVersion: v2\nname: common\nversion: 1.0.0\ntype: library\n");
        let chart = LoadedChart::load(dir.path()).unwrap();
        let err = chart.check_installable().unwrap_err();
        assert_eq!(err.to_string(), "library charts are not installable");
    }

    #[test]
    fn test_missing_chart_yaml() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "values.yaml", "a: 1\n");
        let err = LoadedChart::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Chart.yaml file is missing"));
    }

    #[test]
    fn test_invalid_version() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Chart.yaml", "apiVersion: v2\nname: demo\nversion: latest\n");
        assert!(LoadedChart::load(dir.path()).is_err());
    }
}
