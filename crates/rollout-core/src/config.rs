//! Configuration types for Rollout.

use crate::{error::RolloutError, Result};
use rollout_registry::storage::{APPS_DIR, REGISTRY_FILE};
use rollout_registry::{PortRange, RegistryStore};
use rollout_secrets::{SecretsRegistrar, APP_SECRET_PREFIX, SYSTEM_SECRET};
use rollout_synth::RenderOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the Rollout facade.
///
/// Every section has defaults, so a settings file only needs the keys it
/// changes:
///
/// ```json
/// { "registry": { "port_range": { "start": 20000, "end": 20999 } } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Directory holding `ports.json` and the descriptor directory.
    pub config_dir: PathBuf,

    /// Port registry configuration.
    pub registry: RegistryConfig,

    /// Reverse-proxy settings embedded in every descriptor.
    pub proxy: RenderOptions,

    /// Secret registration and encryption configuration.
    pub secrets: SecretsConfig,

    /// External command settings.
    pub commands: CommandConfig,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("servers"),
            registry: RegistryConfig::default(),
            proxy: RenderOptions::default(),
            secrets: SecretsConfig::default(),
            commands: CommandConfig::default(),
        }
    }
}

/// Port registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry file name inside the config directory.
    pub file: String,

    /// Descriptor directory name inside the config directory.
    pub apps_dir: String,

    /// Allocatable host port range.
    pub port_range: PortRange,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            file: REGISTRY_FILE.to_string(),
            apps_dir: APPS_DIR.to_string(),
            port_range: PortRange::default(),
        }
    }
}

/// Secret registration and encryption configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Access-control declaration, relative to the config directory.
    pub declaration: PathBuf,

    /// Repository-relative directory of per-app encrypted secrets.
    pub app_prefix: String,

    /// Entry whose public keys new app entries copy.
    pub system_entry: String,

    /// Encryption tool invoked as `<program> -e <secret>`.
    pub program: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            declaration: PathBuf::from("../secrets.nix"),
            app_prefix: APP_SECRET_PREFIX.to_string(),
            system_entry: SYSTEM_SECRET.to_string(),
            program: "agenix".to_string(),
        }
    }
}

/// External command settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Timeout for non-interactive commands, in seconds.
    pub timeout_secs: u64,

    /// Timeout for commands attached to the terminal. `None` waits for the
    /// user indefinitely.
    pub interactive_timeout_secs: Option<u64>,

    /// Version-control program.
    pub git: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            interactive_timeout_secs: None,
            git: "git".to_string(),
        }
    }
}

impl RolloutConfig {
    /// Creates the default configuration rooted at `config_dir`.
    pub fn with_config_dir<P: Into<PathBuf>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON settings file.
    ///
    /// # Errors
    ///
    /// Returns `RolloutError::Storage` if the file cannot be read and
    /// `RolloutError::Config` if it is not valid settings JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RolloutError::Storage {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|e| RolloutError::Config(format!("{}: {e}", path.display())))
    }

    /// Checks values that would otherwise fail late.
    ///
    /// # Errors
    ///
    /// Returns `RolloutError::Config` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.config_dir.as_os_str().is_empty() {
            return Err(RolloutError::Config("config_dir is empty".to_string()));
        }
        if self.registry.file.is_empty() || self.registry.apps_dir.is_empty() {
            return Err(RolloutError::Config(
                "registry file and apps_dir must be set".to_string(),
            ));
        }
        if self.proxy.bind_address.is_empty() {
            return Err(RolloutError::Config("proxy.bind_address is empty".to_string()));
        }
        if self.secrets.program.is_empty() || self.commands.git.is_empty() {
            return Err(RolloutError::Config("command programs must be set".to_string()));
        }
        if self.commands.timeout_secs == 0 {
            return Err(RolloutError::Config(
                "commands.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding the generated descriptors.
    pub fn apps_dir(&self) -> PathBuf {
        self.config_dir.join(&self.registry.apps_dir)
    }

    /// Repository root: the parent of the config directory.
    pub fn repo_root(&self) -> PathBuf {
        self.config_dir.join("..")
    }

    /// Path of the access-control declaration.
    pub fn secrets_path(&self) -> PathBuf {
        self.config_dir.join(&self.secrets.declaration)
    }

    /// Command timeout as a `Duration`.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.commands.timeout_secs)
    }

    /// Interactive command timeout, if any.
    pub fn interactive_timeout(&self) -> Option<Duration> {
        self.commands.interactive_timeout_secs.map(Duration::from_secs)
    }

    /// Builds the registry store described by this configuration.
    pub fn registry_store(&self) -> RegistryStore {
        RegistryStore::new(&self.config_dir)
            .with_apps_dir(self.apps_dir())
            .with_range(self.registry.port_range)
            .with_bind_address(self.proxy.bind_address.clone())
            .with_registry_file(&self.registry.file)
    }

    /// Builds the secrets registrar described by this configuration.
    pub fn secrets_registrar(&self) -> SecretsRegistrar {
        SecretsRegistrar::new(self.secrets_path())
            .with_app_prefix(self.secrets.app_prefix.clone())
            .with_system_entry(self.secrets.system_entry.clone())
    }
}
