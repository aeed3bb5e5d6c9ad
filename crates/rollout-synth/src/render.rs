//! # Descriptor Rendering
//!
//! Turns an [`AppSpec`] and an allocated host port into the text of a Nix
//! module declaring an `oci-containers` container routed by Traefik.
//!
//! ## Determinism
//!
//! Rendering is a pure function of its arguments: no clock, no environment,
//! no hash-map iteration. Regenerating a descriptor from the same inputs
//! yields byte-identical output and therefore no diff under version control.
//!
//! ## Output Shape
//!
//! ```text
//! { config, pkgs, ... }:
//! {
//!   virtualisation.oci-containers.containers."<name>" = rec {
//!     image = "<image>";
//!     ports = [ "<bind>:<host>:<container>" ];   ← recovery token
//!     networks = [ "<network>" ];
//!     volumes = [ ... ];                          ← only with mounts
//!     labels = { traefik.* };
//!     environmentFiles = [ ... ];                 ← only with secrets
//!   };
//!   systemd.services."docker-<name>" ... docker pull
//!   age.secrets."<name>".file = ./<name>.age;     ← only with secrets
//! }
//! ```

use crate::spec::AppSpec;
use serde::{Deserialize, Serialize};

/// Host-side settings shared by every descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Address the host side of the port mapping binds to.
    pub bind_address: String,

    /// Traefik entrypoint the router listens on.
    pub entrypoint: String,

    /// Traefik certificate resolver used for TLS.
    pub cert_resolver: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            entrypoint: "websecure".to_string(),
            cert_resolver: "letsencrypt".to_string(),
        }
    }
}

/// Traefik rule matching the public host and its `www.` alias.
pub fn host_rule(spec: &AppSpec) -> String {
    let host = spec.public_host();
    format!("Host(`{host}`) || Host(`www.{host}`)")
}

/// Renders a descriptor with the default [`RenderOptions`].
///
/// # Example
///
/// ```rust
/// use rollout_synth::{render, AppSpec};
///
/// let spec = AppSpec::new("blog", "ghcr.io/x/blog:latest", 3000, "example.com");
/// let text = render(&spec, 10000);
///
/// assert!(text.contains(r#"ports = [ "127.0.0.1:10000:3000" ];"#));
/// assert_eq!(text, render(&spec, 10000));
/// ```
pub fn render(spec: &AppSpec, host_port: u16) -> String {
    render_with(spec, host_port, &RenderOptions::default())
}

/// Renders a descriptor for `spec` bound to `host_port`.
///
/// The spec is expected to have passed [`AppSpec::validate`]; mounts are
/// emitted verbatim.
pub fn render_with(spec: &AppSpec, host_port: u16, options: &RenderOptions) -> String {
    let name = &spec.name;
    let image = &spec.image;
    let network = &spec.network;
    let container_port = spec.container_port;
    let bind = &options.bind_address;
    let entrypoint = &options.entrypoint;
    let resolver = &options.cert_resolver;
    let rule = host_rule(spec);

    let volumes = if spec.mounts.is_empty() {
        String::new()
    } else {
        let quoted: Vec<String> = spec.mounts.iter().map(|m| format!("\"{m}\"")).collect();
        format!("    volumes = [ {} ];", quoted.join(" "))
    };

    let (environment_files, age_secret) = if spec.has_secrets() {
        (
            format!("\n    environmentFiles = [ config.age.secrets.\"{name}\".path ];"),
            format!("\n  age.secrets.\"{name}\".file = ./{name}.age;"),
        )
    } else {
        (String::new(), String::new())
    };

    format!(
        r#"{{ config, pkgs, ... }}:
{{
  virtualisation.oci-containers.containers."{name}" = rec {{
    image = "{image}";
    ports = [ "{bind}:{host_port}:{container_port}" ];
    networks = [ "{network}" ];
{volumes}
    labels = {{
      "traefik.enable" = "true";
      "traefik.docker.network" = "{network}";
      "traefik.http.services.{name}.loadbalancer.server.port" = "{container_port}";

      # domain router
      "traefik.http.routers.{name}.rule" = "{rule}";
      "traefik.http.routers.{name}.entrypoints" = "{entrypoint}";
      "traefik.http.routers.{name}.tls.certresolver" = "{resolver}";
    }};{environment_files}
  }};

  # Force image pull on every deployment
  systemd.services."docker-{name}".serviceConfig.ExecStartPre = [
    "${{pkgs.docker}}/bin/docker pull {image}"
  ];{age_secret}
}}"#
    )
}
