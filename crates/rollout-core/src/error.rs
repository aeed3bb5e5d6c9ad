//! Error types for Rollout Core.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core error type for rollout operations.
#[derive(Debug, Error)]
pub enum RolloutError {
    /// Registry error passthrough (storage, exhaustion, lock).
    #[error(transparent)]
    Registry(#[from] rollout_registry::RegistryError),

    /// Secrets registrar error passthrough.
    #[error(transparent)]
    Secrets(#[from] rollout_secrets::SecretsError),

    /// Application specification rejected before rendering.
    #[error("invalid application spec: {0}")]
    InvalidSpec(#[from] rollout_synth::SpecError),

    /// A descriptor or input file could not be read or written.
    #[error("storage error at {path}: {source}")]
    Storage {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external command could not be started.
    #[error("failed to run {program}: {source}")]
    CommandSpawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully. `output` holds what it
    /// printed, for diagnosis.
    #[error("{program} failed ({status}):\n{output}")]
    CommandFailed {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Combined stdout and stderr.
        output: String,
    },

    /// An external command did not finish in time and was killed.
    /// Re-running the invocation is safe.
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    CommandTimeout {
        /// Program name.
        program: String,
        /// Timeout that expired.
        timeout: Duration,
    },
}
