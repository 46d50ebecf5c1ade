//! Chart resolution
//!
//! `ChartResolver` turns a `ChartReference` into a chart on the local
//! filesystem. Stages run in order and the first one that produces a path or
//! a hard error wins:
//!
//! 1. an existing local file or directory
//! 2. a path-like name that does not exist fails immediately
//! 3. a file of that name in the repository cache
//! 4. a download from an OCI registry, an archive URL, a repository URL or a
//!    repository alias, stored in the cache as `<name>-<version>.tgz`
//!
//! The chart loader underneath is not safe for concurrent use, so every
//! resolve and load holds the resolver's lock for its whole duration.

use helmform_core::{ChartReference, LoadedChart};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{RepositoryEntry, RepositoryFile, default_cache_dir};
use crate::error::{RepoError, Result};
use crate::fetcher::ArtifactFetcher;
use crate::http::HttpRepository;
use crate::provenance::{self, provenance_path};

/// Where repository state lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Helm `repositories.yaml`
    pub repository_config: PathBuf,
    /// Index and archive cache
    pub repository_cache: PathBuf,
}

impl ResolverSettings {
    pub fn new(repository_config: impl Into<PathBuf>, repository_cache: impl Into<PathBuf>) -> Self {
        Self {
            repository_config: repository_config.into(),
            repository_cache: repository_cache.into(),
        }
    }

    /// Helm's default locations
    pub fn from_defaults() -> Result<Self> {
        Ok(Self::new(RepositoryFile::default_path()?, default_cache_dir()?))
    }
}

/// Per-call resolution options
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Check the archive against its provenance file
    pub verify: bool,
    /// Allow prerelease versions
    pub devel: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub pass_credentials: bool,
}

impl ResolveOptions {
    /// Repository entry for an ad-hoc repository URL
    fn repository_entry(&self, url: &str) -> RepositoryEntry {
        RepositoryEntry {
            name: String::new(),
            url: url.to_string(),
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            cert_file: self.cert_file.clone().unwrap_or_default(),
            key_file: self.key_file.clone().unwrap_or_default(),
            ca_file: self.ca_file.clone().unwrap_or_default(),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            pass_credentials_all: self.pass_credentials,
        }
    }
}

/// A loaded chart and the path it was loaded from
#[derive(Debug, Clone)]
pub struct ResolvedChart {
    pub chart: LoadedChart,
    pub path: PathBuf,
}

/// Resolves chart references; shared by every resource operation
pub struct ChartResolver {
    settings: ResolverSettings,
    fetcher: Arc<dyn ArtifactFetcher>,
    lock: Mutex<()>,
}

impl ChartResolver {
    pub fn new(settings: ResolverSettings, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            settings,
            fetcher,
            lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn fetcher(&self) -> &dyn ArtifactFetcher {
        self.fetcher.as_ref()
    }

    /// Resolve a reference to a local path
    pub async fn resolve(&self, reference: &ChartReference, options: &ResolveOptions) -> Result<PathBuf> {
        let _guard = self.lock.lock().await;
        self.locate(reference, options).await
    }

    /// Resolve a reference and load the chart
    pub async fn load(&self, reference: &ChartReference, options: &ResolveOptions) -> Result<ResolvedChart> {
        let _guard = self.lock.lock().await;
        let path = self.locate(reference, options).await?;
        let chart = LoadedChart::load(&path)?;
        Ok(ResolvedChart { chart, path })
    }

    /// Load an already resolved path again
    pub async fn reload(&self, path: &Path) -> Result<ResolvedChart> {
        let _guard = self.lock.lock().await;
        let chart = LoadedChart::load(path)?;
        Ok(ResolvedChart {
            chart,
            path: path.to_path_buf(),
        })
    }

    async fn locate(&self, reference: &ChartReference, options: &ResolveOptions) -> Result<PathBuf> {
        let name = reference.name.trim();
        if name.is_empty() {
            return Err(RepoError::chart_not_found(name, reference.version_constraint()));
        }

        if !reference.is_oci && !reference.is_remote_archive_url {
            let local = Path::new(name);
            if local.exists() {
                let path = std::path::absolute(local)?;
                tracing::debug!("chart {} resolved to local path {}", name, path.display());
                return self.verified(path, options);
            }

            if reference.is_local_path {
                return Err(RepoError::ChartPathNotFound {
                    path: name.to_string(),
                });
            }

            let cached = self.settings.repository_cache.join(name);
            if cached.is_file() {
                tracing::debug!("chart {} resolved from repository cache", name);
                return self.verified(cached, options);
            }
        }

        let path = if reference.is_oci {
            self.pull_oci(reference, options).await?
        } else if reference.is_remote_archive_url {
            self.download_archive_url(name, options).await?
        } else if let Some(url) = reference.repository_url() {
            let entry = options.repository_entry(url);
            let repo = HttpRepository::new(entry, self.fetcher.as_ref());
            let index = repo.fetch_index().await?;
            self.download_from_index(&repo, &index, reference.chart_name(), reference, options)
                .await?
        } else if let Some(alias) = reference.alias() {
            let repositories = RepositoryFile::load_or_default(&self.settings.repository_config)?;
            let entry = repositories
                .get(alias)
                .cloned()
                .ok_or_else(|| RepoError::RepositoryNotFound {
                    name: alias.to_string(),
                })?;
            let repo = HttpRepository::new(entry, self.fetcher.as_ref());
            let index = repo.cached_index(&self.settings.repository_cache).await?;
            self.download_from_index(&repo, &index, reference.chart_name(), reference, options)
                .await?
        } else {
            return Err(RepoError::chart_not_found(name, reference.version_constraint()));
        };

        self.verified(path, options)
    }

    fn verified(&self, path: PathBuf, options: &ResolveOptions) -> Result<PathBuf> {
        if options.verify {
            provenance::verify(&path)?;
        }
        Ok(path)
    }

    async fn download_from_index(
        &self,
        repo: &HttpRepository<'_>,
        index: &crate::index::RepositoryIndex,
        chart_name: &str,
        reference: &ChartReference,
        options: &ResolveOptions,
    ) -> Result<PathBuf> {
        let entry = index
            .find_best_match(chart_name, reference.version_constraint(), options.devel)
            .map_err(|e| match e {
                RepoError::ChartNotFound { .. } => {
                    RepoError::chart_not_found(reference.name.clone(), reference.version_constraint())
                }
                other => other,
            })?;

        let data = repo.download(entry).await?;
        let path = self.store(&entry.archive_name(), &data)?;
        tracing::info!("downloaded chart {} {} to {}", entry.name, entry.version, path.display());

        if options.verify {
            let prov = repo.download_provenance(entry).await.map_err(|e| RepoError::VerificationFailed {
                path: path.display().to_string(),
                message: format!("failed to fetch provenance: {}", e),
            })?;
            std::fs::write(provenance_path(&path), prov)?;
        }
        Ok(path)
    }

    async fn pull_oci(&self, reference: &ChartReference, options: &ResolveOptions) -> Result<PathBuf> {
        let pulled = self
            .fetcher
            .pull_oci(&reference.name, reference.version_constraint(), options.devel)
            .await?;

        let path = self.store(&format!("{}-{}.tgz", pulled.name, pulled.version), &pulled.data)?;
        if let Some(prov) = &pulled.provenance {
            std::fs::write(provenance_path(&path), prov)?;
        }
        tracing::info!("pulled chart {} {} to {}", pulled.name, pulled.version, path.display());
        Ok(path)
    }

    async fn download_archive_url(&self, url: &str, options: &ResolveOptions) -> Result<PathBuf> {
        let entry = options.repository_entry(url);
        let data = self.fetcher.get(url, &entry).await?;

        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "URL does not name an archive".to_string(),
            })?;
        let path = self.store(file_name, &data)?;

        if options.verify {
            let prov = self
                .fetcher
                .get(&format!("{}.prov", url), &entry)
                .await
                .map_err(|e| RepoError::VerificationFailed {
                    path: path.display().to_string(),
                    message: format!("failed to fetch provenance: {}", e),
                })?;
            std::fs::write(provenance_path(&path), prov)?;
        }
        Ok(path)
    }

    /// Write an archive into the cache, creating the directory if needed
    fn store(&self, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.settings.repository_cache)?;
        let path = std::path::absolute(self.settings.repository_cache.join(file_name))?;
        std::fs::write(&path, data)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::RemoteFetcher;
    use crate::http::compute_digest;
    use crate::oci::PulledChart;
    use async_trait::async_trait;
    use helmform_core::archive::create_archive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fetcher that serves one OCI chart and counts calls
    #[derive(Default)]
    struct FakeFetcher {
        archive: Vec<u8>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactFetcher for FakeFetcher {
        async fn get(&self, url: &str, _repository: &RepositoryEntry) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RepoError::NetworkError {
                message: format!("offline: {}", url),
            })
        }

        async fn pull_oci(&self, reference: &str, _constraint: &str, _devel: bool) -> Result<PulledChart> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(PulledChart {
                name: reference.rsplit('/').next().unwrap_or_default().to_string(),
                version: "0.1.0".to_string(),
                data: self.archive.clone(),
                provenance: None,
            })
        }
    }

    fn chart_dir(name: &str, version: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Chart.yaml"),
            format!("apiVersion: v2\nname: {name}\nversion: {version}\n"),
        )
        .unwrap();
        std::fs::write(dir.path().join("values.yaml"), "replicas: 1\n").unwrap();
        dir
    }

    fn chart_archive(name: &str, version: &str) -> Vec<u8> {
        let dir = chart_dir(name, version);
        let out = TempDir::new().unwrap();
        let path = create_archive(dir.path(), name, &out.path().join("chart.tgz")).unwrap();
        std::fs::read(path).unwrap()
    }

    fn resolver(home: &TempDir, fetcher: Arc<dyn ArtifactFetcher>) -> ChartResolver {
        ChartResolver::new(
            ResolverSettings::new(
                home.path().join("repositories.yaml"),
                home.path().join("cache"),
            ),
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_local_directory_wins_over_repository() {
        let home = TempDir::new().unwrap();
        let chart = chart_dir("local", "1.0.0");
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = resolver(&home, fetcher.clone());

        let reference = ChartReference::parse(
            chart.path().to_str().unwrap(),
            "https://example.com/charts",
            "",
        );
        let resolved = resolver.load(&reference, &ResolveOptions::default()).await.unwrap();
        assert!(resolved.path.is_absolute());
        assert_eq!(resolved.chart.name(), "local");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_dot_path_does_not_fall_through() {
        let home = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = resolver(&home, fetcher.clone());

        let reference = ChartReference::parse("./does-not-exist", "https://example.com/charts", "");
        let err = resolver.resolve(&reference, &ResolveOptions::default()).await.unwrap_err();
        assert!(matches!(err, RepoError::ChartPathNotFound { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_stage() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join("cache")).unwrap();
        std::fs::write(home.path().join("cache/app-1.0.0.tgz"), chart_archive("app", "1.0.0")).unwrap();

        let resolver = resolver(&home, Arc::new(FakeFetcher::default()));
        let reference = ChartReference::parse("app-1.0.0.tgz", "", "");
        let resolved = resolver.load(&reference, &ResolveOptions::default()).await.unwrap();
        assert_eq!(resolved.chart.version(), "1.0.0");
    }

    #[tokio::test]
    async fn test_unknown_chart() {
        let home = TempDir::new().unwrap();
        let resolver = resolver(&home, Arc::new(FakeFetcher::default()));
        let err = resolver
            .resolve(&ChartReference::parse("nginx", "", "1.0.0"), &ResolveOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "chart \"nginx\" version \"1.0.0\" not found");
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let home = TempDir::new().unwrap();
        let resolver = resolver(&home, Arc::new(FakeFetcher::default()));
        let err = resolver
            .resolve(&ChartReference::parse("nginx", "nope", ""), &ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::RepositoryNotFound { name } if name == "nope"));
    }

    #[tokio::test]
    async fn test_verify_directory_fails() {
        let home = TempDir::new().unwrap();
        let chart = chart_dir("local", "1.0.0");
        let resolver = resolver(&home, Arc::new(FakeFetcher::default()));
        let options = ResolveOptions {
            verify: true,
            ..Default::default()
        };
        let err = resolver
            .resolve(&ChartReference::parse(chart.path().to_str().unwrap(), "", ""), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::VerificationFailed { .. }));
    }

    async fn serve_repository(archive: &[u8]) -> MockServer {
        let server = MockServer::start().await;
        let index = format!(
            "apiVersion: v1\nentries:\n  demo:\n    - name: demo\n      version: 0.2.0\n      urls: [demo-0.2.0.tgz]\n      digest: {}\n    - name: demo\n      version: 0.1.0\n      urls: [demo-0.1.0.tgz]\n",
            compute_digest(archive)
        );
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/demo-0.2.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_repository_url_download() {
        let archive = chart_archive("demo", "0.2.0");
        let server = serve_repository(&archive).await;
        let home = TempDir::new().unwrap();
        let resolver = resolver(&home, Arc::new(RemoteFetcher::default()));

        let reference = ChartReference::parse("demo", &server.uri(), "^0.2");
        let resolved = resolver.load(&reference, &ResolveOptions::default()).await.unwrap();

        assert_eq!(resolved.path, home.path().join("cache/demo-0.2.0.tgz"));
        assert_eq!(resolved.chart.name(), "demo");
        assert_eq!(resolved.chart.values.get("replicas").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_alias_download_uses_repositories_file() {
        let archive = chart_archive("demo", "0.2.0");
        let server = serve_repository(&archive).await;
        let home = TempDir::new().unwrap();

        let mut repositories = RepositoryFile::default();
        repositories.update(RepositoryEntry::new("myrepo", server.uri()));
        repositories.save_to(&home.path().join("repositories.yaml")).unwrap();

        let resolver = resolver(&home, Arc::new(RemoteFetcher::default()));
        let reference = ChartReference::parse("demo", "myrepo", "");
        let path = resolver.resolve(&reference, &ResolveOptions::default()).await.unwrap();

        assert_eq!(path, home.path().join("cache/demo-0.2.0.tgz"));
        assert!(home.path().join("cache/myrepo-index.yaml").exists());
    }

    #[tokio::test]
    async fn test_oci_pull_and_single_flight() {
        let home = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            archive: chart_archive("app", "0.1.0"),
            ..Default::default()
        });
        let resolver = Arc::new(resolver(&home, fetcher.clone()));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let resolver = resolver.clone();
            tasks.push(tokio::spawn(async move {
                let reference = ChartReference::parse("oci://registry.example.com/charts/app", "", "");
                resolver.load(&reference, &ResolveOptions::default()).await
            }));
        }
        for task in tasks {
            let resolved = task.await.unwrap().unwrap();
            assert_eq!(resolved.chart.name(), "app");
            assert_eq!(resolved.path, home.path().join("cache/app-0.1.0.tgz"));
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
