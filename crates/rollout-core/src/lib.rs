//! # Rollout Core
//!
//! Deployment-descriptor generation for containerized applications on a
//! shared Traefik host. Orchestrates the port registry, the descriptor
//! synthesizer and the secrets registrar, and drives the external tools
//! (agenix, git) around them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ROLLOUT CORE                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────────┐                          │
//! │                    │     Rollout     │  ← Facade                │
//! │                    └────────┬────────┘                          │
//! │                             │                                   │
//! │         ┌───────────────────┼───────────────────┐               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │    Port     │    │   Config    │    │   Secrets   │          │
//! │  │  Registry   │    │ Synthesizer │    │  Registrar  │          │
//! │  └─────────────┘    └─────────────┘    └─────────────┘          │
//! │                                                                 │
//! │         CommandRunner → agenix -e · git add/commit/push         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## `init` Flow
//!
//! 1. Validate the [`AppSpec`]
//! 2. Lock the registry, load it (recovering from descriptors if missing)
//! 3. Allocate a host port and render the descriptor
//! 4. Write `apps/<name>.nix`, then save `ports.json`, then unlock
//! 5. If a secret is declared: register it in `secrets.nix` and encrypt it
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollout_core::{AppSpec, Rollout, RolloutConfig, SecretSource};
//!
//! # async fn run() -> rollout_core::Result<()> {
//! let rollout = Rollout::new(RolloutConfig::with_config_dir("./servers"))?;
//!
//! let spec = AppSpec::new("blog", "ghcr.io/x/blog:latest", 3000, "example.com")
//!     .with_secret(SecretSource::File(".env.blog".into()));
//!
//! let done = rollout.init(&spec).await?;
//! assert!(done.secret.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Notes
//!
//! - Core crates never print; progress is logged through `tracing` and
//!   results are returned to the caller
//! - External commands are killed when they outlive their timeout
//! - Nothing is retried; every operation is safe to re-run

mod config;
mod encrypt;
mod error;
mod process;
mod rollout;
mod vcs;
mod workflow;

pub use config::{CommandConfig, RegistryConfig, RolloutConfig, SecretsConfig};
pub use encrypt::SecretEncryptor;
pub use error::RolloutError;
pub use process::{CommandOutput, CommandRunner, Input};
pub use rollout::{Generated, Initialized, Rollout, SecretProvision};
pub use vcs::{commit_message, CommitOutcome, DeployOutcome, Git, DEFAULT_COMMIT_MESSAGE};
pub use workflow::{github_action, DEFAULT_BRANCH, DEFAULT_DEPLOY_REPO};

// Re-export component types for convenience
pub use rollout_registry::{PortRange, PortRegistry, RegistryError};
pub use rollout_secrets::{Registration, SecretsError};
pub use rollout_synth::{AppSpec, RenderOptions, SecretSource, SpecError, DEFAULT_NETWORK};

/// Core result type for rollout operations.
pub type Result<T> = std::result::Result<T, RolloutError>;
