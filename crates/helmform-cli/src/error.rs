//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use helmform_core::CoreError;
use helmform_provider::ProviderError;
use helmform_release::ReleaseError;
use helmform_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Overlays or overrides could not be merged
    #[error("Invalid values: {message}")]
    #[diagnostic(code(helmform::cli::values))]
    Values {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart could not be resolved or loaded
    #[error("Chart error: {message}")]
    #[diagnostic(code(helmform::cli::chart))]
    Chart { message: String },

    /// Rendering or manifest normalization failed
    #[error("Render error: {message}")]
    #[diagnostic(code(helmform::cli::render))]
    Render { message: String },

    /// Malformed command line argument
    #[error("{message}")]
    #[diagnostic(code(helmform::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(helmform::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(helmform::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Values { .. } => exit_codes::VALUES_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn usage(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidOverride { .. } => CliError::Values {
                message: err.to_string(),
                help: Some("overrides take the form key.path=value, list indices as key[0]".to_string()),
            },
            CoreError::InvalidValues { .. } => CliError::Values {
                message: err.to_string(),
                help: None,
            },
            CoreError::Io(e) => e.into(),
            other => CliError::Chart {
                message: other.to_string(),
            },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Core(e) => e.into(),
            other => CliError::Chart {
                message: other.to_string(),
            },
        }
    }
}

impl From<ReleaseError> for CliError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::Core(e) => e.into(),
            ReleaseError::Io(e) => e.into(),
            other => CliError::Render {
                message: other.to_string(),
            },
        }
    }
}

impl From<ProviderError> for CliError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Core(e) => e.into(),
            ProviderError::Repo(e) => e.into(),
            ProviderError::Release(e) => e.into(),
            ProviderError::Io(e) => e.into(),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
