//! Helmform chart resolution
//!
//! This crate locates charts and brings them onto the local filesystem:
//!
//! - **Local charts**: directories and packaged archives on disk
//! - **HTTP repositories**: Helm-style repos with `index.yaml`, addressed by
//!   URL or by an alias from `repositories.yaml`
//! - **OCI registries**: `oci://` references, authenticated from the registry
//!   config
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use helmform_core::ChartReference;
//! use helmform_repo::{ChartResolver, RemoteFetcher, ResolveOptions, ResolverSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = ChartResolver::new(ResolverSettings::from_defaults()?, Arc::new(RemoteFetcher::default()));
//!
//! let reference = ChartReference::parse("redis", "https://charts.bitnami.com/bitnami", "~17.0");
//! let resolved = resolver.load(&reference, &ResolveOptions::default()).await?;
//! println!("{} {}", resolved.chart.name(), resolved.path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are not sent after cross-origin redirects unless the
//!   repository sets `pass_credentials_all`
//! - Downloads are checked against the index digest

pub mod config;
pub mod constraint;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod index;
pub mod oci;
pub mod provenance;
pub mod resolver;

pub use config::{RepositoryEntry, RepositoryFile, default_cache_dir};
pub use constraint::Constraint;
pub use credentials::{Credentials, RegistryConfig, ScopedCredentials, SecureHttpClient};
pub use error::{RepoError, Result};
pub use fetcher::{ArtifactFetcher, RemoteFetcher};
pub use http::HttpRepository;
pub use index::{ChartVersion, RepositoryIndex};
pub use oci::{OciReference, OciRegistry, PulledChart};
pub use provenance::{Verification, verify};
pub use resolver::{ChartResolver, ResolveOptions, ResolvedChart, ResolverSettings};
