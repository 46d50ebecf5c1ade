//! Helmform Provider - Helm releases as declarative resources
//!
//! This crate exposes the operations a Terraform-style plugin calls:
//! - **`helm_release`**: plan, create, read, update, delete, exists and import
//!   of a release ([`ReleaseResource`])
//! - **`helm_template`**: local rendering split per template ([`TemplateDataSource`])
//! - **`helm_repository`**: the legacy repository data source and its
//!   resource shim ([`RepositoryDataSource`], [`RepositoryResource`])
//!
//! Every operation takes a configured [`Meta`], built once from a
//! [`ProviderConfig`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use helmform_provider::{Meta, ProviderConfig, ReleaseConfig, ReleaseResource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let meta = Meta::configure(ProviderConfig::default()).await?;
//!
//! let mut config = ReleaseConfig::new("cache", "redis");
//! config.repository = "https://charts.bitnami.com/bitnami".to_string();
//!
//! let applied = ReleaseResource::new(&meta).create(&config).await?;
//! println!("{} is {}", applied.state.id, applied.state.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod meta;
pub mod release;
pub mod repository;
pub mod schema;
pub mod template;

pub use config::{Experiments, HelmDriver, KubernetesConfig, ProviderConfig, RegistryLogin};
pub use error::{Applied, Diagnostic, ProviderError, Result, Severity};
pub use meta::Meta;
pub use release::{ReleaseResource, parse_import_id};
pub use repository::{RepositoryDataSource, RepositoryResource};
pub use schema::{
    ReleaseConfig, ReleaseMetadata, ReleaseState, RepositoryConfig, RepositoryMetadata, RepositoryState,
    TemplateConfig, TemplateState,
};
pub use template::TemplateDataSource;
