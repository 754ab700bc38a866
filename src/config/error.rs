//! Error types for configuration validation and persistence.

use std::io;
use std::path::PathBuf;

/// Structural problems found in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is not defined in the configuration file")]
    MissingKey(String),

    #[error("{key} must be {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("{key} is invalid: {reason}")]
    DomainViolation { key: String, reason: String },
}

impl ValidationError {
    pub(crate) fn type_mismatch(key: impl Into<String>, expected: &'static str) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected,
        }
    }

    pub(crate) fn domain(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DomainViolation {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Name of the offending key (dotted for nested entries).
    pub fn key(&self) -> &str {
        match self {
            Self::MissingKey(key) => key,
            Self::TypeMismatch { key, .. } | Self::DomainViolation { key, .. } => key,
        }
    }
}

/// Failures reading, parsing or rewriting the persisted configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
