//! # Rollout Synth - Descriptor Synthesis
//!
//! Pure, deterministic generation of Nix `oci-containers` descriptors for
//! applications fronted by Traefik.
//!
//! The synthesizer never allocates ports and never touches the filesystem.
//! The caller supplies the host port (from `rollout-registry`) and decides
//! where the text goes, so allocation and rendering can be tested apart.
//!
//! ## Usage
//!
//! ```rust
//! use rollout_synth::{render, AppSpec, SecretSource};
//!
//! let spec = AppSpec::new("blog", "ghcr.io/x/blog:latest", 3000, "example.com")
//!     .with_subdomain("www2")
//!     .with_secret(SecretSource::Edit);
//! spec.validate().unwrap();
//!
//! let descriptor = render(&spec, 10000);
//! assert!(descriptor.contains("Host(`www2.example.com`)"));
//! ```

mod render;
mod spec;

pub use render::{host_rule, render, render_with, RenderOptions};
pub use spec::{AppSpec, SecretSource, SpecError, DEFAULT_NETWORK};
