//! HTTP chart repositories
//!
//! Helm-style repositories serve an `index.yaml` listing every chart version
//! and the archive URLs to download them from.

use std::path::Path;
use url::Url;

use crate::config::RepositoryEntry;
use crate::error::{RepoError, Result};
use crate::fetcher::ArtifactFetcher;
use crate::index::{ChartVersion, RepositoryIndex};

/// HTTP repository client
pub struct HttpRepository<'a> {
    entry: RepositoryEntry,
    fetcher: &'a dyn ArtifactFetcher,
}

impl<'a> HttpRepository<'a> {
    pub fn new(entry: RepositoryEntry, fetcher: &'a dyn ArtifactFetcher) -> Self {
        Self { entry, fetcher }
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn url(&self) -> &str {
        &self.entry.url
    }

    /// Fetch the index from the repository
    pub async fn fetch_index(&self) -> Result<RepositoryIndex> {
        let data = self.fetcher.get(&self.entry.index_url(), &self.entry).await?;
        RepositoryIndex::from_bytes(&data)
    }

    /// Fetch the index and store it as `<cache>/<name>-index.yaml`
    pub async fn update_index(&self, cache_dir: &Path) -> Result<RepositoryIndex> {
        let data = self.fetcher.get(&self.entry.index_url(), &self.entry).await?;
        let index = RepositoryIndex::from_bytes(&data)?;

        std::fs::create_dir_all(cache_dir)?;
        std::fs::write(self.entry.index_cache_path(cache_dir), &data)?;
        tracing::debug!("cached index of repository {}", self.entry.name);
        Ok(index)
    }

    /// Index from the cache when present, otherwise fetched and cached
    pub async fn cached_index(&self, cache_dir: &Path) -> Result<RepositoryIndex> {
        let cached = self.entry.index_cache_path(cache_dir);
        if cached.exists() {
            let data = std::fs::read(&cached)?;
            return RepositoryIndex::from_bytes(&data);
        }
        self.update_index(cache_dir).await
    }

    /// Absolute download URL of a chart version
    pub fn chart_url(&self, chart: &ChartVersion) -> Result<String> {
        let url = chart.download_url().ok_or_else(|| {
            RepoError::chart_not_found(chart.name.clone(), chart.version.clone())
        })?;

        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }

        let base = Url::parse(&format!("{}/", self.entry.url.trim_end_matches('/')))?;
        Ok(base.join(url)?.to_string())
    }

    /// Download a chart archive, checking the index digest when present
    pub async fn download(&self, chart: &ChartVersion) -> Result<Vec<u8>> {
        let url = self.chart_url(chart)?;
        let data = self.fetcher.get(&url, &self.entry).await?;

        if let Some(expected_digest) = &chart.digest {
            let actual_digest = compute_digest(&data);
            if !digest_matches(expected_digest, &actual_digest) {
                return Err(RepoError::IntegrityCheckFailed {
                    name: chart.name.clone(),
                    expected: expected_digest.clone(),
                    actual: actual_digest,
                });
            }
        }

        Ok(data)
    }

    /// Download the `.prov` file published next to a chart archive
    pub async fn download_provenance(&self, chart: &ChartVersion) -> Result<Vec<u8>> {
        let url = format!("{}.prov", self.chart_url(chart)?);
        self.fetcher.get(&url, &self.entry).await
    }
}

/// Compute SHA256 digest of data
pub fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Check if two digests match, ignoring case and the `sha256:` prefix
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    fn normalize(d: &str) -> String {
        d.trim()
            .to_lowercase()
            .replace("sha256:", "")
            .replace("sha256-", "")
    }
    normalize(expected) == normalize(actual)
}
