//! # Rollout Secrets - Access-Control Registration
//!
//! Applications that ship an environment secret need an entry in the agenix
//! `secrets.nix` declaration before the encryption tool will accept them.
//! This crate adds that entry, copying the recipient keys of the
//! system-wide secret, and never touches anything else in the file.
//!
//! The text matching is deliberately confined to [`SecretsRegistrar`] so it
//! can later be replaced by a structured Nix model without changing callers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollout_secrets::{Registration, SecretsRegistrar};
//!
//! let registrar = SecretsRegistrar::new("../secrets.nix");
//! let outcome = registrar.register("blog")?;
//! assert!(matches!(outcome, Registration::Inserted | Registration::AlreadyPresent));
//! # Ok::<(), rollout_secrets::SecretsError>(())
//! ```

mod error;
mod registrar;

pub use error::{Result, SecretsError};
pub use registrar::{Registration, SecretsRegistrar, APP_SECRET_PREFIX, SYSTEM_SECRET};
