//! Error types for bisync-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that end the CLI with a non-zero status
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from the reconciliation engine
    #[error(transparent)]
    Core(#[from] bisync_core::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Report could not be rendered as JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Detail lines printed under the error message.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Core(bisync_core::Error::OperationsFailed { failures }) => {
                failures.iter().map(|f| f.to_string()).collect()
            }
            Self::Core(bisync_core::Error::CheckSyncFailed { differences }) => {
                differences.iter().take(20).cloned().collect()
            }
            _ => Vec::new(),
        }
    }
}
