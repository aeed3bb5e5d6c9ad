//! # Recovery Scanner
//!
//! Rebuilds a [`PortRegistry`] from descriptors already on disk when no
//! `ports.json` exists. Each descriptor embeds its host port in a fixed token:
//!
//! ```text
//! ports = [ "127.0.0.1:10005:3000" ];
//!            ^bind     ^host ^container
//! ```
//!
//! Recovery is best-effort reconciliation. A file that cannot be read, has no
//! port token, or claims a port that is out of range or already taken is
//! skipped with a warning and left out of the rebuilt registry.

use crate::models::{PortRange, RegistryError, Result};
use crate::registry::PortRegistry;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// File extension of generated descriptors.
pub const DESCRIPTOR_EXTENSION: &str = "nix";

/// Extracts host ports from descriptor text.
#[derive(Debug, Clone)]
pub struct PortScanner {
    pattern: Regex,
    range: PortRange,
}

impl PortScanner {
    /// Creates a scanner for descriptors bound to `bind_address`.
    pub fn new(bind_address: &str, range: PortRange) -> Self {
        let pattern = format!(
            r#"ports = \[ "{}:(\d+):\d+" \];"#,
            regex::escape(bind_address)
        );
        Self {
            pattern: Regex::new(&pattern).expect("escaped port pattern is a valid regex"),
            range,
        }
    }

    /// Returns the host port embedded in `content`, if the token is present
    /// and the number fits a port.
    pub fn extract_port(&self, content: &str) -> Option<u16> {
        self.pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Rebuilds a registry from every descriptor in `dir`.
    ///
    /// A missing directory yields an empty registry. The cursor is set one
    /// past the highest recovered port, or to the start of the range if
    /// nothing was recovered.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Storage` only if `dir` exists but cannot be
    /// listed. Problems with individual files never fail the scan.
    pub fn scan(&self, dir: &Path) -> Result<PortRegistry> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "no descriptor directory, starting empty");
                return Ok(PortRegistry::new(self.range));
            }
            Err(e) => return Err(RegistryError::storage(dir, e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::storage(dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(DESCRIPTOR_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut allocations = BTreeMap::new();
        let mut taken = HashSet::new();
        let mut highest: Option<u16> = None;

        for path in paths {
            let Some(app) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!(path = %path.display(), "skipping descriptor with non UTF-8 name");
                continue;
            };

            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable descriptor");
                    continue;
                }
            };

            let Some(port) = self.extract_port(&content) else {
                warn!(path = %path.display(), "skipping descriptor without a host port");
                continue;
            };

            if !self.range.contains(port) {
                warn!(app, port, range = %self.range, "skipping descriptor with out-of-range port");
                continue;
            }
            if !taken.insert(port) {
                warn!(app, port, "skipping descriptor whose port is already recovered");
                continue;
            }

            debug!(app, port, "recovered port allocation");
            allocations.insert(app.to_string(), port);
            highest = highest.max(Some(port));
        }

        let next_port = match highest {
            Some(port) => u32::from(port) + 1,
            None => u32::from(self.range.start()),
        };

        info!(
            recovered = allocations.len(),
            next_port,
            "rebuilt port registry from existing descriptors"
        );

        Ok(PortRegistry::from_parts(allocations, next_port, self.range))
    }
}
