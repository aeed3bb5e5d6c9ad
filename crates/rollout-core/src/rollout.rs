//! The Rollout facade.
//!
//! [`Rollout`] ties the registry, the synthesizer and the secrets registrar
//! together into the `init` flow, and owns the external collaborators used
//! by `deploy`.

use crate::{
    config::RolloutConfig,
    encrypt::SecretEncryptor,
    error::RolloutError,
    process::CommandRunner,
    vcs::{DeployOutcome, Git},
    Result,
};

use rollout_registry::{write_atomic, PortRegistry, RegistryError, RegistryStore};
use rollout_secrets::{Registration, SecretsRegistrar};
use rollout_synth::{render_with, AppSpec, SecretSource};

use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A rendered descriptor and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Host port bound for the application.
    pub host_port: u16,
    /// Descriptor text.
    pub descriptor: String,
    /// Descriptor location (`<config-dir>/apps/<name>.nix`).
    pub path: PathBuf,
    /// False if the application already held its port.
    pub newly_allocated: bool,
}

/// What happened to an application's secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretProvision {
    /// Outcome of the access-control registration.
    pub registration: Registration,
    /// Repository-relative path of the encrypted secret.
    pub secret_path: String,
    /// Output of the encryption tool; empty in edit mode, where it wrote
    /// to the terminal.
    pub output: String,
}

/// Result of a complete `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initialized {
    /// Descriptor written to disk.
    pub generated: Generated,
    /// Secret handling, if the application declared one.
    pub secret: Option<SecretProvision>,
}

/// The Rollout facade.
///
/// # Example
///
/// ```rust,no_run
/// use rollout_core::{AppSpec, Rollout, RolloutConfig};
///
/// # async fn run() -> rollout_core::Result<()> {
/// let rollout = Rollout::new(RolloutConfig::with_config_dir("./servers"))?;
/// let spec = AppSpec::new("blog", "ghcr.io/x/blog:latest", 3000, "example.com");
///
/// let done = rollout.init(&spec).await?;
/// println!("{} -> {}", done.generated.path.display(), done.generated.host_port);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Rollout {
    /// Configuration.
    config: RolloutConfig,

    /// Registry persistence.
    store: RegistryStore,

    /// Access-control declaration patcher.
    registrar: SecretsRegistrar,

    /// Runner shared by every external collaborator.
    runner: CommandRunner,
}

impl Rollout {
    /// Creates a facade from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `RolloutError::Config` if the configuration is invalid.
    pub fn new(config: RolloutConfig) -> Result<Self> {
        config.validate()?;

        let store = config.registry_store();
        let registrar = config.secrets_registrar();
        let runner = CommandRunner::new(config.command_timeout(), config.interactive_timeout());

        debug!(
            config_dir = %config.config_dir.display(),
            range = %config.registry.port_range,
            "rollout initialized"
        );

        Ok(Self {
            config,
            store,
            registrar,
            runner,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Where the descriptor for `name` is written.
    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.config.apps_dir().join(format!("{name}.nix"))
    }

    /// Renders the descriptor `generate` would write, without writing
    /// anything or persisting an allocation.
    ///
    /// # Errors
    ///
    /// - `RolloutError::InvalidSpec` if the spec fails validation
    /// - `RolloutError::Registry` if the registry cannot be loaded or the
    ///   range is exhausted
    pub fn preview(&self, spec: &AppSpec) -> Result<Generated> {
        spec.validate()?;

        let mut registry = self.store.load()?;
        let newly_allocated = !registry.contains(&spec.name);
        let host_port = registry.allocate(&spec.name)?;

        Ok(Generated {
            host_port,
            descriptor: render_with(spec, host_port, &self.config.proxy),
            path: self.descriptor_path(&spec.name),
            newly_allocated,
        })
    }

    /// Allocates a host port for `spec`, writes its descriptor and persists
    /// the registry.
    ///
    /// Load→Allocate→Save runs under the registry lock. The registry is
    /// saved only after the descriptor is on disk, so a crash in between
    /// leaves a descriptor that recovery will pick up.
    ///
    /// # Errors
    ///
    /// - `RolloutError::InvalidSpec` if the spec fails validation
    /// - `RolloutError::Registry` on lock, load, exhaustion or save failure
    /// - `RolloutError::Storage` if the descriptor cannot be written
    pub fn generate(&self, spec: &AppSpec) -> Result<Generated> {
        spec.validate()?;

        let _lock = self.store.lock()?;
        let mut registry = self.store.load()?;
        let newly_allocated = !registry.contains(&spec.name);
        let host_port = registry.allocate(&spec.name)?;

        let descriptor = render_with(spec, host_port, &self.config.proxy);
        let path = self.descriptor_path(&spec.name);
        write_descriptor(&path, &descriptor)?;

        self.store.save(&registry)?;

        info!(
            app = %spec.name,
            host_port,
            newly_allocated,
            path = %path.display(),
            "generated descriptor"
        );

        Ok(Generated {
            host_port,
            descriptor,
            path,
            newly_allocated,
        })
    }

    /// Adds `name`'s entry to the access-control declaration.
    pub fn register_secret(&self, name: &str) -> Result<Registration> {
        let registration = self.registrar.register(name)?;
        info!(app = name, ?registration, "registered secret");
        Ok(registration)
    }

    /// Registers and encrypts the secret `spec` declares.
    ///
    /// Returns `None` without touching anything when the spec has no secret.
    ///
    /// # Errors
    ///
    /// - `RolloutError::Secrets` if the declaration cannot be patched
    /// - `RolloutError::Command*` if the encryption tool fails
    pub async fn provision_secret(&self, spec: &AppSpec) -> Result<Option<SecretProvision>> {
        if !spec.secret.is_declared() {
            debug!(app = %spec.name, "no secret declared");
            return Ok(None);
        }

        let registration = self.register_secret(&spec.name)?;
        let secret_path = self.registrar.secret_path(&spec.name);
        let encryptor = self.encryptor();

        let output = match &spec.secret {
            SecretSource::File(source) => encryptor.encrypt_file(&secret_path, source).await?,
            SecretSource::Edit => {
                encryptor.edit(&secret_path).await?;
                String::new()
            }
            SecretSource::None => String::new(),
        };

        Ok(Some(SecretProvision {
            registration,
            secret_path,
            output,
        }))
    }

    /// Runs the full `init` flow: generate, then provision the secret.
    pub async fn init(&self, spec: &AppSpec) -> Result<Initialized> {
        let generated = self.generate(spec)?;
        let secret = self.provision_secret(spec).await?;
        Ok(Initialized { generated, secret })
    }

    /// Current allocations, recovered from descriptors if the registry file
    /// is missing. Nothing is written.
    pub fn ports(&self) -> Result<PortRegistry> {
        Ok(self.store.load()?)
    }

    /// The encryption collaborator, run from the repository root.
    pub fn encryptor(&self) -> SecretEncryptor {
        SecretEncryptor::new(
            self.config.secrets.program.clone(),
            self.config.repo_root(),
            self.runner.clone(),
        )
    }

    /// The version-control collaborator for the repository holding the
    /// config directory.
    pub fn git(&self) -> Git {
        let root = Git::discover_root(&self.config.config_dir)
            .unwrap_or_else(|| self.config.repo_root());
        Git::new(self.config.commands.git.clone(), root, self.runner.clone())
    }

    /// Stages, commits and pushes the repository.
    pub async fn deploy(&self, messages: &[String]) -> Result<DeployOutcome> {
        self.git().deploy(messages).await
    }
}

fn write_descriptor(path: &Path, descriptor: &str) -> Result<()> {
    write_atomic(path, descriptor.as_bytes()).map_err(|e| match e {
        RegistryError::Storage { path, source } => RolloutError::Storage { path, source },
        other => other.into(),
    })
}
