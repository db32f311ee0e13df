//! Error types for bisync-core

use std::path::PathBuf;

use crate::report::OperationFailure;
use crate::delta::Side;

/// Result type for bisync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a reconciliation run
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// One or more option values are invalid; raised before any I/O
    #[error("Invalid configuration: {}", problems.join("; "))]
    Config { problems: Vec<String> },

    /// A side could not be listed
    #[error("Listing {side} failed: {source}")]
    Listing {
        side: Side,
        #[source]
        source: bisync_fs::Error,
    },

    /// Another run holds the lock for this pair
    #[error("Another bisync run holds the lock at {path}; wait for it to finish")]
    ConcurrentRun { path: PathBuf },

    /// Persisted state could not be parsed
    #[error("State file {path} is corrupt ({message}); run with --resync to rebuild it")]
    StateCorrupt { path: PathBuf, message: String },

    /// A safety guard refused to let the run proceed
    #[error("Safety abort: {reason}. No changes were made")]
    SafetyAbort { reason: String },

    /// The pair has no usable baseline
    #[error("Resync required: {reason}")]
    ResyncRequired { reason: String },

    /// The previous run was interrupted
    #[error(
        "The previous run was interrupted; its journal is kept in the work directory. \
         Rerun with --recover to finish it, or --resync to rebuild the baseline"
    )]
    RecoveryRequired,

    /// Post-run listings disagree
    #[error("Listings differ after sync ({} paths); a resync is required", differences.len())]
    CheckSyncFailed { differences: Vec<String> },

    /// The run was cancelled by the operator
    #[error("Run cancelled by operator; if execution had started, rerun with --recover")]
    Cancelled,

    /// Operations failed with resilient mode off
    #[error("{} operations failed; state marked as needing recovery", failures.len())]
    OperationsFailed { failures: Vec<OperationFailure> },

    /// Storage error outside of listing
    #[error(transparent)]
    Fs(#[from] bisync_fs::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Build a configuration error from a single problem.
    pub fn config(problem: impl Into<String>) -> Self {
        Self::Config {
            problems: vec![problem.into()],
        }
    }
}
