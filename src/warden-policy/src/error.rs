//! Error types for policy derivation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while deriving a policy.
///
/// Absent profiles, empty glob matches and missing paths are not errors;
/// they are dropped from the policy instead.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A profile includes itself, directly or through other profiles.
    #[error("include cycle detected: {} is already being loaded", .path.display())]
    IncludeCycle { path: PathBuf },

    /// Includes nest deeper than the configured limit.
    #[error("include depth limit of {limit} exceeded at {}", .path.display())]
    IncludeTooDeep { path: PathBuf, limit: usize },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a policy operation.
pub type PolicyResult<T> = Result<T, PolicyError>;
