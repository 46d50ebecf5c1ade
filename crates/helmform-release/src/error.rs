//! Error types for helmform-release

use thiserror::Error;

use crate::release::Release;

/// Result type for helmform-release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Errors that can occur while managing a release
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReleaseError {
    /// Release does not exist in the namespace
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Install or upgrade failed after the release was recorded
    #[error("release '{}' failed: {message}", release.name)]
    ReleaseFailed {
        release: Box<Release>,
        message: String,
    },

    /// Dependencies declared in Chart.yaml are not vendored under charts/
    #[error("found in Chart.yaml, but missing in charts/ directory: {}", missing.join(", "))]
    DependencyCheckFailed { chart: String, missing: Vec<String> },

    /// Linter reported errors
    #[error("malformed chart or values: \n\t{}", messages.join("\n\t"))]
    LintFailed { chart: String, messages: Vec<String> },

    /// Error reported by the Helm toolchain, passed through verbatim
    #[error("{0}")]
    Helm(String),

    /// Error reported by the Kubernetes API server, passed through verbatim
    #[error("{0}")]
    Api(String),

    /// Chart or values error
    #[error(transparent)]
    Core(#[from] helmform_core::CoreError),

    /// Manifest could not be normalized
    #[error("could not convert manifest to JSON: {0}")]
    InvalidManifest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReleaseError {
    fn from(e: serde_json::Error) -> Self {
        ReleaseError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ReleaseError {
    fn from(e: serde_yaml::Error) -> Self {
        ReleaseError::Serialization(e.to_string())
    }
}

impl ReleaseError {
    pub fn not_found(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::ReleaseNotFound {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Check if this error means the release is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReleaseError::ReleaseNotFound { .. })
    }

    /// Upgrade dry-runs fail this way while a release has never deployed
    pub fn is_no_deployed_releases(&self) -> bool {
        match self {
            ReleaseError::Helm(message) | ReleaseError::Api(message) => {
                message.contains("has no deployed releases")
            }
            _ => false,
        }
    }

    /// Release recorded alongside a failed install or upgrade
    pub fn failed_release(&self) -> Option<&Release> {
        match self {
            ReleaseError::ReleaseFailed { release, .. } => Some(release),
            _ => None,
        }
    }
}
