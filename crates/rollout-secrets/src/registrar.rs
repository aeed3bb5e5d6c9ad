//! # Secrets Registrar
//!
//! Grants an application's encrypted env file the same recipients as the
//! system-wide secret by adding one entry to `secrets.nix`:
//!
//! ```text
//! {
//!   "servers/secrets/system.age".publicKeys = [ host admin ];
//!
//!   "servers/apps/blog.age".publicKeys = [ host admin ];   ← inserted
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Idempotent**: an existing entry for the application means no write.
//! - **Splice only**: the entry is inserted before the last `}` of the file;
//!   every other byte is preserved. The file is never reformatted, reordered
//!   or re-parsed as Nix.
//! - **Atomic**: the patched file is synced and then replaces the original
//!   via rename, keeping the original's permissions.

use crate::error::{Result, SecretsError};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Key of the system-wide entry whose public keys are reused.
pub const SYSTEM_SECRET: &str = "servers/secrets/system.age";

/// Directory, relative to the repository root, holding per-app secrets.
pub const APP_SECRET_PREFIX: &str = "servers/apps";

/// Outcome of a [`SecretsRegistrar::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new entry was written.
    Inserted,
    /// An entry already existed; the file was not touched.
    AlreadyPresent,
}

/// Patches an agenix `secrets.nix` declaration.
///
/// # Example
///
/// ```rust,no_run
/// use rollout_secrets::{Registration, SecretsRegistrar};
///
/// let registrar = SecretsRegistrar::new("./secrets.nix");
/// match registrar.register("blog").unwrap() {
///     Registration::Inserted => println!("added blog"),
///     Registration::AlreadyPresent => println!("blog already registered"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SecretsRegistrar {
    path: PathBuf,
    app_prefix: String,
    system_entry: String,
    keys_pattern: Regex,
}

impl SecretsRegistrar {
    /// Creates a registrar for the declaration at `path` using the default
    /// entry layout.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            app_prefix: APP_SECRET_PREFIX.to_string(),
            system_entry: SYSTEM_SECRET.to_string(),
            keys_pattern: keys_pattern(SYSTEM_SECRET),
        }
    }

    /// Overrides the directory prefix of per-app entries.
    pub fn with_app_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.app_prefix = prefix.into();
        self
    }

    /// Overrides the system-wide entry the public keys are copied from.
    pub fn with_system_entry(mut self, entry: impl Into<String>) -> Self {
        self.system_entry = entry.into();
        self.keys_pattern = keys_pattern(&self.system_entry);
        self
    }

    /// Path of the declaration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Repository-relative path of the encrypted secret for `app`
    /// (e.g. `servers/apps/blog.age`).
    pub fn secret_path(&self, app: &str) -> String {
        format!("{}/{app}.age", self.app_prefix)
    }

    /// The quoted key identifying `app`'s entry in the declaration.
    pub fn entry_key(&self, app: &str) -> String {
        format!("\"{}\"", self.secret_path(app))
    }

    /// Returns the declaration text with an entry for `app` spliced in, or
    /// `None` if one is already present.
    ///
    /// # Errors
    ///
    /// - `SecretsError::KeysNotFound` if the system entry has no key list
    /// - `SecretsError::MalformedDeclaration` if there is no closing `}`
    pub fn splice(&self, content: &str, app: &str) -> Result<Option<String>> {
        let key = self.entry_key(app);
        if content.contains(&key) {
            return Ok(None);
        }

        let keys = self
            .keys_pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| SecretsError::KeysNotFound {
                path: self.path.clone(),
                entry: self.system_entry.clone(),
            })?;

        let brace = content
            .rfind('}')
            .ok_or_else(|| SecretsError::MalformedDeclaration {
                path: self.path.clone(),
            })?;

        let entry = format!("\n  {key}.publicKeys = {keys};\n");

        let mut patched = String::with_capacity(content.len() + entry.len());
        patched.push_str(&content[..brace]);
        patched.push_str(&entry);
        patched.push_str(&content[brace..]);
        Ok(Some(patched))
    }

    /// Adds an entry for `app` unless one exists.
    ///
    /// # Errors
    ///
    /// Returns `SecretsError::Io` if the file cannot be read or replaced,
    /// plus any error from [`SecretsRegistrar::splice`].
    pub fn register(&self, app: &str) -> Result<Registration> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io(e))?;

        let Some(patched) = self.splice(&content, app)? else {
            info!(
                entry = %self.entry_key(app),
                path = %self.path.display(),
                "secret entry already exists, skipping"
            );
            return Ok(Registration::AlreadyPresent);
        };

        self.write(patched.as_bytes())?;
        info!(entry = %self.entry_key(app), path = %self.path.display(), "registered secret entry");
        Ok(Registration::Inserted)
    }

    fn write(&self, contents: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // The declaration is patched, not owned: keep its mode.
        let permissions = std::fs::metadata(&self.path)
            .map_err(|e| self.io(e))?
            .permissions();

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io(e))?;
        tmp.as_file()
            .set_permissions(permissions)
            .map_err(|e| self.io(e))?;
        tmp.write_all(contents).map_err(|e| self.io(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io(e))?;
        tmp.persist(&self.path).map_err(|e| self.io(e.error))?;

        debug!(path = %self.path.display(), bytes = contents.len(), "wrote declaration");
        Ok(())
    }

    fn io(&self, source: std::io::Error) -> SecretsError {
        SecretsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn keys_pattern(system_entry: &str) -> Regex {
    let pattern = format!(
        r#""{}"\.publicKeys = (\[[^\]]*\]);"#,
        regex::escape(system_entry)
    );
    Regex::new(&pattern).expect("escaped key pattern is a valid regex")
}
