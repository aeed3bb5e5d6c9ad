//! # Rollout Port Registry - Host Port Allocation
//!
//! Every application deployed behind the reverse proxy binds its container to
//! a host port on the loopback interface. This crate decides which port each
//! application gets and remembers the decision.
//!
//! ## Purpose
//!
//! 1. **Allocation** - Hand out unique ports from a fixed range, reusing the
//!    same port every time an application is regenerated.
//!
//! 2. **Persistence** - Store allocations as pretty-printed JSON next to the
//!    generated descriptors so they can be reviewed in version control.
//!
//! 3. **Recovery** - When the registry file is missing, rebuild it from the
//!    port tokens embedded in existing descriptors.
//!
//! 4. **Mutual exclusion** - An advisory lock on the config directory
//!    serialises concurrent Load→Allocate→Save sequences against it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      PORT REGISTRY                         │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  ┌──────────────────┐          ┌────────────────────────┐  │
//! │  │  RegistryStore   │  load    │     PortRegistry       │  │
//! │  │                  │────────▶ │                        │  │
//! │  │  ports.json      │          │  allocations: name→port│  │
//! │  │  flock(dir)      │ ◀────────│  next_port: cursor     │  │
//! │  └────────┬─────────┘  save    └────────────────────────┘  │
//! │           │ missing                                        │
//! │           ▼                                                │
//! │  ┌──────────────────┐                                      │
//! │  │   PortScanner    │  apps/*.nix → "127.0.0.1:P:C"        │
//! │  └──────────────────┘                                      │
//! │                                                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollout_registry::storage::RegistryStore;
//!
//! let store = RegistryStore::new("./servers");
//! let _lock = store.lock()?;
//!
//! let mut registry = store.load()?;
//! let port = registry.allocate("blog")?;
//! println!("blog -> 127.0.0.1:{port}");
//!
//! // Persist only after the descriptor using `port` is on disk.
//! store.save(&registry)?;
//! # Ok::<(), rollout_registry::RegistryError>(())
//! ```
//!
//! ## Concurrency Notes
//!
//! - The registry is single-writer. Hold [`storage::RegistryLock`] across the
//!   whole Load→Allocate→Save sequence.
//! - Saving is an atomic rename, so readers never see a torn file.
//! - A descriptor written without a matching registry save is healed by
//!   recovery on the next cold start.

pub mod models;
pub mod recovery;
pub mod registry;
pub mod storage;

pub use models::{PortRange, RegistryError, Result, PORT_RANGE_END, PORT_RANGE_START};
pub use recovery::PortScanner;
pub use registry::PortRegistry;
pub use storage::{write_atomic, RegistryLock, RegistryStore};

#[cfg(test)]
mod tests;
