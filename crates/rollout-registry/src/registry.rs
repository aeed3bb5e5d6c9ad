//! # Port Registry - Allocation State
//!
//! [`PortRegistry`] is the in-memory form of `ports.json`: a mapping from
//! application name to host port plus a cursor naming the next candidate.
//!
//! ## Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | Every allocated port lies in the range | [`PortRegistry::allocate`], [`PortRegistry::check`] |
//! | No two applications share a port | [`PortRegistry::allocate`], [`PortRegistry::check`] |
//! | A name keeps its port forever | `allocate` returns existing entries unchanged |
//! | The cursor never decreases | `allocate` only ever moves it forward |
//!
//! ## Allocation Flow
//!
//! 1. If the name already has a port, return it (no state change)
//! 2. Scan from `next_port` up to the end of the range
//! 3. Skip every port already held by another application
//! 4. Assign the first free port and move the cursor past it
//! 5. If the scan runs off the end of the range: `PortsExhausted`

use crate::models::{PortRange, RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Host port allocations keyed by application name.
///
/// Allocations are held in a `BTreeMap` so the serialized registry lists
/// applications in a stable order and diffs cleanly under version control.
///
/// # Example
///
/// ```rust
/// use rollout_registry::{PortRange, PortRegistry};
///
/// let mut registry = PortRegistry::new(PortRange::new(10000, 10002).unwrap());
///
/// let blog = registry.allocate("blog").unwrap();
/// assert_eq!(blog, 10000);
///
/// // Allocation is idempotent per name
/// assert_eq!(registry.allocate("blog").unwrap(), 10000);
/// assert_eq!(registry.allocate("shop").unwrap(), 10001);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRegistry {
    /// Application name to allocated host port.
    allocations: BTreeMap<String, u16>,

    /// Next candidate port. Stored wider than a port so that a cursor
    /// sitting one past `u16::MAX` is representable.
    next_port: u32,

    /// Range in force for this process; not persisted.
    #[serde(skip)]
    range: PortRange,
}

impl PortRegistry {
    /// Creates an empty registry whose cursor starts at the beginning of `range`.
    pub fn new(range: PortRange) -> Self {
        Self {
            allocations: BTreeMap::new(),
            next_port: u32::from(range.start()),
            range,
        }
    }

    /// Builds a registry from previously assigned ports.
    ///
    /// The caller is responsible for the allocations being unique and in
    /// range; [`PortRegistry::check`] verifies it.
    pub(crate) fn from_parts(
        allocations: BTreeMap<String, u16>,
        next_port: u32,
        range: PortRange,
    ) -> Self {
        Self {
            allocations,
            next_port,
            range,
        }
    }

    /// Returns the port for `name`, allocating one if the name is new.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::PortsExhausted` when no free port remains
    /// between the cursor and the end of the range. This is the only error
    /// this method produces.
    pub fn allocate(&mut self, name: &str) -> Result<u16> {
        if let Some(&port) = self.allocations.get(name) {
            debug!(app = name, port, "reusing existing port allocation");
            return Ok(port);
        }

        let exhausted = RegistryError::PortsExhausted {
            start: self.range.start(),
            end: self.range.end(),
        };

        let Ok(first) = u16::try_from(self.next_port) else {
            return Err(exhausted);
        };
        let first = first.max(self.range.start());

        let used: HashSet<u16> = self.allocations.values().copied().collect();

        for port in first..=self.range.end() {
            if used.contains(&port) {
                continue;
            }
            self.allocations.insert(name.to_string(), port);
            self.next_port = u32::from(port) + 1;
            debug!(app = name, port, next_port = self.next_port, "allocated port");
            return Ok(port);
        }

        Err(exhausted)
    }

    /// Returns the port allocated to `name`, if any.
    pub fn get(&self, name: &str) -> Option<u16> {
        self.allocations.get(name).copied()
    }

    /// Returns true if `name` has an allocation.
    pub fn contains(&self, name: &str) -> bool {
        self.allocations.contains_key(name)
    }

    /// Iterates over `(name, port)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.allocations.iter().map(|(name, &port)| (name.as_str(), port))
    }

    /// The next candidate port the cursor points at.
    pub fn next_port(&self) -> u32 {
        self.next_port
    }

    /// The port range this registry allocates from.
    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Number of allocated applications.
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Returns true if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub(crate) fn set_range(&mut self, range: PortRange) {
        self.range = range;
    }

    /// Verifies the uniqueness and range invariants.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Corrupt` naming the first offending entry.
    pub fn check(&self) -> Result<()> {
        let mut owners: BTreeMap<u16, &str> = BTreeMap::new();

        for (name, &port) in &self.allocations {
            if !self.range.contains(port) {
                return Err(RegistryError::Corrupt(format!(
                    "{name} holds port {port} outside range {}",
                    self.range
                )));
            }
            if let Some(other) = owners.insert(port, name) {
                return Err(RegistryError::Corrupt(format!(
                    "port {port} is allocated to both {other} and {name}"
                )));
            }
        }

        Ok(())
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new(PortRange::default())
    }
}
