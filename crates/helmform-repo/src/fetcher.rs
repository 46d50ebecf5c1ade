//! Artifact fetcher abstraction
//!
//! The resolver never talks to the network directly; it goes through an
//! `ArtifactFetcher` so that resolution can be exercised against fakes.

use async_trait::async_trait;

use crate::config::RepositoryEntry;
use crate::credentials::{RegistryConfig, SecureHttpClient};
use crate::error::Result;
use crate::oci::{OciRegistry, PulledChart};

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` with the credentials and TLS settings of `repository`
    async fn get(&self, url: &str, repository: &RepositoryEntry) -> Result<Vec<u8>>;

    /// Pull the best tag of an `oci://` reference matching `constraint`
    async fn pull_oci(&self, reference: &str, constraint: &str, devel: bool) -> Result<PulledChart>;
}

/// Fetcher backed by HTTP and OCI registries
pub struct RemoteFetcher {
    registry: OciRegistry,
}

impl RemoteFetcher {
    pub fn new(logins: RegistryConfig) -> Self {
        Self {
            registry: OciRegistry::new(logins),
        }
    }
}

impl Default for RemoteFetcher {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[async_trait]
impl ArtifactFetcher for RemoteFetcher {
    async fn get(&self, url: &str, repository: &RepositoryEntry) -> Result<Vec<u8>> {
        tracing::debug!("fetching {}", url);
        let client = SecureHttpClient::for_repository(repository)?;
        client.get_bytes(url).await
    }

    async fn pull_oci(&self, reference: &str, constraint: &str, devel: bool) -> Result<PulledChart> {
        self.registry.pull(reference, constraint, devel).await
    }
}
