//! The legacy `helm_repository` data source, and a resource shim over it

use helmform_repo::{HttpRepository, RepositoryEntry, RepositoryFile};

use crate::error::Result;
use crate::meta::Meta;
use crate::schema::{RepositoryConfig, RepositoryMetadata, RepositoryState};

/// Registers a repository and refreshes its cached index
pub struct RepositoryDataSource<'a> {
    meta: &'a Meta,
}

impl<'a> RepositoryDataSource<'a> {
    pub fn new(meta: &'a Meta) -> Self {
        Self { meta }
    }

    pub async fn read(&self, config: &RepositoryConfig) -> Result<RepositoryState> {
        let settings = self.meta.resolver().settings();
        let entry = entry(config);

        let mut file = RepositoryFile::load_or_default(&settings.repository_config)?;
        file.update(entry.clone());
        file.save_to(&settings.repository_config)?;
        tracing::info!("helm_repository: {} has been added to your repositories", config.name);

        let repository = HttpRepository::new(entry, self.meta.resolver().fetcher());
        let index = repository.update_index(&settings.repository_cache).await?;
        tracing::debug!(
            "helm_repository: {} index lists {} charts",
            config.name,
            index.entries.len()
        );

        Ok(RepositoryState {
            id: config.name.clone(),
            config: config.clone(),
            metadata: RepositoryMetadata {
                name: config.name.clone(),
                url: config.url.clone(),
            },
        })
    }
}

/// Resource form of the repository data source
pub struct RepositoryResource<'a> {
    source: RepositoryDataSource<'a>,
    meta: &'a Meta,
}

impl<'a> RepositoryResource<'a> {
    pub fn new(meta: &'a Meta) -> Self {
        Self {
            source: RepositoryDataSource::new(meta),
            meta,
        }
    }

    pub async fn create(&self, config: &RepositoryConfig) -> Result<RepositoryState> {
        self.source.read(config).await
    }

    pub async fn read(&self, state: &RepositoryState) -> Result<RepositoryState> {
        self.source.read(&state.config).await
    }

    pub async fn update(&self, config: &RepositoryConfig) -> Result<RepositoryState> {
        self.source.read(config).await
    }

    /// Remove the repository entry and its cached index
    pub async fn delete(&self, state: &RepositoryState) -> Result<()> {
        let settings = self.meta.resolver().settings();
        let mut file = RepositoryFile::load_or_default(&settings.repository_config)?;
        if file.remove(&state.config.name) {
            file.save_to(&settings.repository_config)?;
            tracing::info!("helm_repository: {} has been removed from your repositories", state.config.name);
        }

        let cached = entry(&state.config).index_cache_path(&settings.repository_cache);
        if cached.exists() {
            std::fs::remove_file(cached)?;
        }
        Ok(())
    }
}

fn entry(config: &RepositoryConfig) -> RepositoryEntry {
    let mut entry = RepositoryEntry::new(&config.name, &config.url);
    entry.username = config.username.clone().unwrap_or_default();
    entry.password = config.password.clone().unwrap_or_default();
    entry.ca_file = config.ca_file.clone().unwrap_or_default();
    entry.cert_file = config.cert_file.clone().unwrap_or_default();
    entry.key_file = config.key_file.clone().unwrap_or_default();
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::tests::meta;
    use helmform_release::MockReleaseDriver;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INDEX: &str = r#"apiVersion: v1
entries:
  demo:
    - name: demo
      version: 0.1.0
      urls:
        - charts/demo-0.1.0.tgz
"#;

    #[tokio::test]
    async fn test_read_registers_repository() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let meta = meta(&temp, &MockReleaseDriver::new(), false);
        let config = RepositoryConfig {
            name: "stable".to_string(),
            url: server.uri(),
            username: Some("admin".to_string()),
            ..Default::default()
        };

        let state = RepositoryDataSource::new(&meta).read(&config).await.unwrap();
        assert_eq!(state.id, "stable");
        assert_eq!(state.metadata.url, server.uri());

        let file = RepositoryFile::load_or_default(&temp.path().join("repositories.yaml")).unwrap();
        assert_eq!(file.get("stable").unwrap().username, "admin");
        assert!(temp.path().join("cache/stable-index.yaml").exists());
    }

    #[tokio::test]
    async fn test_read_unreachable_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let meta = meta(&temp, &MockReleaseDriver::new(), false);
        let config = RepositoryConfig {
            name: "broken".to_string(),
            url: server.uri(),
            ..Default::default()
        };

        assert!(RepositoryDataSource::new(&meta).read(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_resource_shim_lifecycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let meta = meta(&temp, &MockReleaseDriver::new(), false);
        let resource = RepositoryResource::new(&meta);
        let config = RepositoryConfig {
            name: "stable".to_string(),
            url: server.uri(),
            ..Default::default()
        };

        let state = resource.create(&config).await.unwrap();
        assert_eq!(resource.read(&state).await.unwrap(), state);

        resource.delete(&state).await.unwrap();
        let file = RepositoryFile::load_or_default(&temp.path().join("repositories.yaml")).unwrap();
        assert!(file.get("stable").is_none());
        assert!(!temp.path().join("cache/stable-index.yaml").exists());

        // deleting twice is harmless
        resource.delete(&state).await.unwrap();
    }
}
