//! Application specifications and their validation.
//!
//! An [`AppSpec`] is everything the synthesizer needs to know about an
//! application apart from its host port. Validation happens here, before
//! rendering, so [`crate::render`] itself cannot fail.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Reverse-proxy network used when none is given.
pub const DEFAULT_NETWORK: &str = "web";

/// Where an application's environment secret comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "path")]
pub enum SecretSource {
    /// The application has no secrets.
    #[default]
    None,
    /// Encrypt an existing plaintext env file.
    File(PathBuf),
    /// Open the encryption tool's editor interactively.
    Edit,
}

impl SecretSource {
    /// Returns true unless the source is [`SecretSource::None`].
    pub fn is_declared(&self) -> bool {
        !matches!(self, SecretSource::None)
    }
}

/// Metadata describing one containerized application.
///
/// `name` doubles as the descriptor's file stem, the container name, the
/// Traefik router/service name and the secret's logical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Stable identifier (e.g. `kabilan108-com`).
    pub name: String,

    /// Container image reference (e.g. `ghcr.io/x/blog:latest`).
    pub image: String,

    /// Port the container listens on.
    pub container_port: u16,

    /// Primary domain (e.g. `example.com`).
    pub domain: String,

    /// Optional subdomain; empty means the bare domain.
    #[serde(default)]
    pub subdomain: String,

    /// Docker network shared with the reverse proxy.
    #[serde(default = "default_network")]
    pub network: String,

    /// Volume specifications, passed through to the descriptor.
    #[serde(default)]
    pub mounts: Vec<String>,

    /// Secret source, if any.
    #[serde(default)]
    pub secret: SecretSource,
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

/// A field of an [`AppSpec`] failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// A required field is empty.
    #[error("{0} is required")]
    Missing(&'static str),

    /// The container port is zero.
    #[error("container port must be between 1 and 65535")]
    InvalidPort,

    /// A field contains characters that cannot appear in the descriptor.
    #[error("{field} contains an invalid character: {value:?}")]
    InvalidCharacter {
        /// Offending field.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// A mount is not of the form `source:/target[:ro|rw]`.
    #[error("invalid mount {0:?}: expected /host:/container[:ro|rw] or name:/container[:ro|rw]")]
    InvalidMount(String),
}

impl AppSpec {
    /// Creates a spec with the default network, no mounts and no secrets.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        container_port: u16,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            container_port,
            domain: domain.into(),
            subdomain: String::new(),
            network: default_network(),
            mounts: Vec::new(),
            secret: SecretSource::None,
        }
    }

    /// Sets the subdomain.
    pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = subdomain.into();
        self
    }

    /// Sets the reverse-proxy network.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Appends a mount.
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mounts.push(mount.into());
        self
    }

    /// Sets the secret source.
    pub fn with_secret(mut self, secret: SecretSource) -> Self {
        self.secret = secret;
        self
    }

    /// The public hostname: `subdomain.domain`, or `domain` without a subdomain.
    pub fn public_host(&self) -> String {
        if self.subdomain.is_empty() {
            self.domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.domain)
        }
    }

    /// Returns true if the application declares a secret source.
    pub fn has_secrets(&self) -> bool {
        self.secret.is_declared()
    }

    /// Checks that every field can be embedded in a descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpecError`] found, checking fields in declaration
    /// order.
    pub fn validate(&self) -> Result<(), SpecError> {
        require("name", &self.name)?;
        // The name is a segment of dot-separated Traefik label keys.
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        {
            return Err(invalid("name", &self.name));
        }

        require("image", &self.image)?;
        plain("image", &self.image)?;

        if self.container_port == 0 {
            return Err(SpecError::InvalidPort);
        }

        require("domain", &self.domain)?;
        plain("domain", &self.domain)?;
        if !self.subdomain.is_empty() {
            plain("subdomain", &self.subdomain)?;
        }

        require("network", &self.network)?;
        plain("network", &self.network)?;

        for mount in &self.mounts {
            validate_mount(mount)?;
        }

        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), SpecError> {
    if value.trim().is_empty() {
        Err(SpecError::Missing(field))
    } else {
        Ok(())
    }
}

fn invalid(field: &'static str, value: &str) -> SpecError {
    SpecError::InvalidCharacter {
        field,
        value: value.to_string(),
    }
}

/// Rejects anything that would terminate or interpolate inside a Nix string
/// or a Traefik rule.
fn plain(field: &'static str, value: &str) -> Result<(), SpecError> {
    let breaks_out = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '`' | '\\'))
        || value.contains("${");
    if breaks_out {
        Err(invalid(field, value))
    } else {
        Ok(())
    }
}

fn validate_mount(mount: &str) -> Result<(), SpecError> {
    let bad = || SpecError::InvalidMount(mount.to_string());

    if mount.is_empty()
        || mount.contains("${")
        || mount.chars().any(|c| c.is_control() || matches!(c, '"' | '\\'))
    {
        return Err(bad());
    }

    let parts: Vec<&str> = mount.split(':').collect();
    let (source, target, mode) = match parts.as_slice() {
        [source, target] => (*source, *target, None),
        [source, target, mode] => (*source, *target, Some(*mode)),
        _ => return Err(bad()),
    };

    if source.is_empty() || !target.starts_with('/') {
        return Err(bad());
    }
    if let Some(mode) = mode {
        if !matches!(mode, "ro" | "rw") {
            return Err(bad());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> AppSpec {
        AppSpec::new("blog", "ghcr.io/x/blog:latest", 3000, "example.com")
    }

    #[test]
    fn test_public_host() {
        assert_eq!(blog().public_host(), "example.com");
        assert_eq!(blog().with_subdomain("api").public_host(), "api.example.com");
    }

    #[test]
    fn test_valid_spec() {
        let spec = blog()
            .with_subdomain("api")
            .with_mount("/srv/blog:/data:rw")
            .with_mount("blog-cache:/cache")
            .with_secret(SecretSource::Edit);
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_missing_fields() {
        let mut spec = blog();
        spec.name.clear();
        assert_eq!(spec.validate(), Err(SpecError::Missing("name")));

        let mut spec = blog();
        spec.domain = "  ".to_string();
        assert_eq!(spec.validate(), Err(SpecError::Missing("domain")));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut spec = blog();
        spec.container_port = 0;
        assert_eq!(spec.validate(), Err(SpecError::InvalidPort));
    }

    #[test]
    fn test_name_must_be_label_safe() {
        for name in ["../etc", "a/b", ".hidden", "with space", "my.app"] {
            let mut spec = blog();
            spec.name = name.to_string();
            assert!(
                matches!(spec.validate(), Err(SpecError::InvalidCharacter { field: "name", .. })),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_quotes_and_interpolation_rejected() {
        let mut spec = blog();
        spec.image = "evil\"image".to_string();
        assert!(spec.validate().is_err());

        let mut spec = blog();
        spec.domain = "${builtins.currentTime}".to_string();
        assert!(spec.validate().is_err());

        let spec = blog().with_subdomain("a`b");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_mount_shapes() {
        for good in ["/host:/container", "/host:/container:ro", "name:/container:rw"] {
            assert_eq!(validate_mount(good), Ok(()), "{good}");
        }
        for bad in [
            "",
            "/only-one-part",
            "/host:relative",
            ":/container",
            "/host:/container:rx",
            "/a:/b:ro:extra",
            "/a\":/b",
            "/a:/b\n",
        ] {
            assert!(validate_mount(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_spec_deserialization_defaults() {
        let spec: AppSpec = serde_json::from_str(
            r#"{"name":"blog","image":"nginx:latest","container_port":80,"domain":"example.com"}"#,
        )
        .unwrap();

        assert_eq!(spec.network, "web");
        assert!(spec.mounts.is_empty());
        assert_eq!(spec.secret, SecretSource::None);
        assert!(!spec.has_secrets());
    }

    #[test]
    fn test_secret_source_serialization() {
        let json = serde_json::to_string(&SecretSource::File(PathBuf::from("/tmp/.env"))).unwrap();
        assert_eq!(json, r#"{"mode":"file","path":"/tmp/.env"}"#);
        assert!(SecretSource::Edit.is_declared());
    }
}
