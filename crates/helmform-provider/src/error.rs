//! Error and diagnostic types for helmform-provider

use helmform_core::CoreError;
use helmform_release::ReleaseError;
use helmform_repo::RepoError;
use thiserror::Error;

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// Import identifier is not `namespace/name`
    #[error("Unexpected ID format ({id:?}), expected namespace/name")]
    InvalidImportId { id: String },

    /// A `show_only` entry matched no rendered template
    #[error("could not find template {path} in chart")]
    TemplateNotFound { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ProviderError {
    fn from(e: serde_yaml::Error) -> Self {
        ProviderError::Serialization(e.to_string())
    }
}

impl ProviderError {
    /// Release is absent from the cluster
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Release(e) if e.is_not_found())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A message surfaced to the user alongside (or instead of) new state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(e: &ProviderError) -> Self {
        Diagnostic::error(e.to_string())
    }
}

/// New state of an applied resource and the diagnostics that accompany it
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub state: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Applied<T> {
    pub fn clean(state: T) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Warning)
    }
}
