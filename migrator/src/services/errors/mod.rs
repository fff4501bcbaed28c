use std::path::PathBuf;

use thiserror::Error;

use crate::services::client::ClientError;
use crate::services::config::ConfigError;
use crate::services::source::SourceError;
use crate::services::tunnel::TunnelError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Storage error: {source} ({context})")]
    Storage {
        source: StorageError,
        context: String,
    },

    #[error("Destination error: {0}")]
    Destination(#[from] ClientError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Cannot run {step}: {reason}")]
    PrerequisiteNotMet { step: String, reason: String },

    #[error("Migration step error: {step} - {reason}")]
    MigrationStep { step: String, reason: String },

    #[error("Not connected to {component}")]
    NotConnected { component: String },

    #[error("State file is locked by another process: {} ({owner})", path.display())]
    StateLocked { path: PathBuf, owner: String },

    #[error("Resume error: {reason}")]
    Resume { reason: String },
}

/// Failures touching the state file, mapping files or export artifacts
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O failed on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Compression failed for {}: {source}", path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StorageError::Parse {
            path: path.into(),
            source,
        }
    }
}

impl From<StorageError> for MigrationError {
    fn from(error: StorageError) -> Self {
        MigrationError::Storage {
            source: error,
            context: "Storage operation failed".to_string(),
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    pub fn with_context(self, context: &str) -> Self {
        match self {
            MigrationError::Storage { source, .. } => MigrationError::Storage {
                source,
                context: context.to_string(),
            },
            other => other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            MigrationError::Destination(err) => err.is_transient(),
            MigrationError::Tunnel(_) => true,
            MigrationError::Source(err) => err.is_connection_error(),
            _ => false,
        }
    }

    /// Get error severity for logging/alerting purposes
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MigrationError::Storage { source, .. } => match source {
                StorageError::Parse { .. } => ErrorSeverity::Critical,
                _ => ErrorSeverity::High,
            },
            MigrationError::StateLocked { .. } => ErrorSeverity::High,
            MigrationError::Configuration(_) => ErrorSeverity::High,
            MigrationError::Authentication { .. } => ErrorSeverity::High,
            MigrationError::Resume { .. } => ErrorSeverity::High,
            MigrationError::PrerequisiteNotMet { .. } => ErrorSeverity::Low,
            MigrationError::Destination(err) if err.is_transient() => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_context_is_replaced() {
        let err: MigrationError = StorageError::NotFound {
            path: PathBuf::from("/tmp/missing.json"),
        }
        .into();
        let err = err.with_context("loading mapping");

        match err {
            MigrationError::Storage { context, .. } => assert_eq!(context, "loading mapping"),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_exhaustion_is_retryable_later() {
        let err = MigrationError::Destination(ClientError::RateLimitExceeded { retries: 5 });
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Low);

        let err = MigrationError::PrerequisiteNotMet {
            step: "import_assets".to_string(),
            reason: "export_assets must be completed first".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Cannot run import_assets: export_assets must be completed first"
        );
    }
}
