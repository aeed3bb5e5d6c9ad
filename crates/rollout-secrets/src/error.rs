//! Error types for the secrets registrar.
//!
//! Every variant is fatal to the secrets step only. The descriptor has
//! already been written by the time registration runs and is not rolled back.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for registrar operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while patching the access-control declaration.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The declaration file could not be read or written.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Declaration file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The system-wide entry whose public keys are copied is missing or
    /// malformed.
    #[error("could not find {entry} public keys in {path}")]
    KeysNotFound {
        /// Declaration file path.
        path: PathBuf,
        /// Key of the system-wide entry that was searched for.
        entry: String,
    },

    /// The declaration has no closing brace to insert before.
    #[error("could not find closing brace in {path}")]
    MalformedDeclaration {
        /// Declaration file path.
        path: PathBuf,
    },
}
