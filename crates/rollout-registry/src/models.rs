//! # Core Data Models for the Port Registry
//!
//! This module defines the types shared by the registry, its on-disk store
//! and the recovery scanner.
//!
//! ## Invariants
//!
//! The types in this module carry the registry's invariants:
//!
//! - **Range**: [`PortRange`] is always non-empty (`start <= end`).
//! - **Exhaustion**: [`RegistryError::PortsExhausted`] is the only error an
//!   allocation can produce.
//! - **Storage failures** always carry the path that failed, so a caller can
//!   report exactly which file was unreadable or unwritable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Lowest host port handed out by the registry.
pub const PORT_RANGE_START: u16 = 10000;

/// Highest host port handed out by the registry (inclusive).
pub const PORT_RANGE_END: u16 = 19999;

/// An inclusive range of allocatable host ports.
///
/// # Example
///
/// ```rust
/// use rollout_registry::PortRange;
///
/// let range = PortRange::new(10000, 10002).unwrap();
/// assert!(range.contains(10001));
/// assert!(!range.contains(10003));
/// assert_eq!(range.len(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortRange")]
pub struct PortRange {
    start: u16,
    end: u16,
}

#[derive(Deserialize)]
struct RawPortRange {
    start: u16,
    end: u16,
}

impl TryFrom<RawPortRange> for PortRange {
    type Error = RegistryError;

    fn try_from(raw: RawPortRange) -> Result<Self> {
        PortRange::new(raw.start, raw.end)
    }
}

impl PortRange {
    /// Creates a range covering `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidRange` if `start > end`.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start > end {
            return Err(RegistryError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// First port of the range.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Last port of the range (inclusive).
    pub fn end(&self) -> u16 {
        self.end
    }

    /// Returns true if `port` lies within the range.
    #[inline]
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Number of ports in the range.
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// A range is never empty; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: PORT_RANGE_START,
            end: PORT_RANGE_END,
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Errors produced by the port registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry store or descriptor directory could not be read or written.
    #[error("storage error at {path}: {source}")]
    Storage {
        /// File or directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The registry file exists but is not valid JSON for a registry.
    #[error("failed to parse port registry: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted registry violates an invariant (duplicate or
    /// out-of-range port).
    #[error("port registry is inconsistent: {0}")]
    Corrupt(String),

    /// Every port in the range is already allocated.
    #[error("no available ports in range {start}-{end}")]
    PortsExhausted {
        /// First port of the exhausted range.
        start: u16,
        /// Last port of the exhausted range.
        end: u16,
    },

    /// A port range with `start > end` was requested.
    #[error("invalid port range {start}-{end}")]
    InvalidRange {
        /// Requested first port.
        start: u16,
        /// Requested last port.
        end: u16,
    },

    /// The advisory lock guarding the registry could not be acquired.
    #[error("failed to lock port registry at {path}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
