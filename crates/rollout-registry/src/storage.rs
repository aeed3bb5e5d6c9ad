//! # Persistent Storage Layer
//!
//! This module persists the [`PortRegistry`] as pretty-printed JSON at
//! `<config-dir>/ports.json` so that allocations diff cleanly under version
//! control.
//!
//! ## Storage Layout
//!
//! | Path | Contents | Purpose |
//! |------|----------|---------|
//! | `ports.json` | `allocations` map + `next_port` cursor | Registry state |
//! | `apps/*.nix` | descriptors | Ground truth for recovery |
//!
//! ## Consistency Notes
//!
//! - Writes go to a temporary file in the same directory which is then renamed
//!   over `ports.json`, so a crash never leaves a half-written registry.
//! - Load→Allocate→Save is serialised by an advisory lock on the config
//!   directory itself (a `ports.json.lock` file on non-Unix targets).
//! - Replacements keep the permissions of the file they replace.
//! - A missing `ports.json` is not an error: the registry is rebuilt from the
//!   descriptors by the [`PortScanner`].
//! - The registry must only be saved after the descriptor that uses a newly
//!   allocated port has been written.

use crate::models::{PortRange, RegistryError, Result};
use crate::recovery::PortScanner;
use crate::registry::PortRegistry;
use fs2::FileExt;
use std::fs::File;
#[cfg(not(unix))]
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the persisted registry inside the config directory.
pub const REGISTRY_FILE: &str = "ports.json";

/// Default name of the descriptor directory inside the config directory.
pub const APPS_DIR: &str = "apps";

/// Default bind address embedded in descriptor port tokens.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// On-disk home of a [`PortRegistry`].
///
/// # Example
///
/// ```rust,no_run
/// use rollout_registry::storage::RegistryStore;
///
/// let store = RegistryStore::new("./servers");
///
/// let _lock = store.lock().unwrap();
/// let mut registry = store.load().unwrap();
/// let port = registry.allocate("blog").unwrap();
/// // ... write apps/blog.nix using `port` ...
/// store.save(&registry).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RegistryStore {
    /// Path to `ports.json`.
    path: PathBuf,

    /// Directory scanned when `ports.json` is missing.
    apps_dir: PathBuf,

    /// Range new registries allocate from.
    range: PortRange,

    /// Bind address used to recognise port tokens during recovery.
    bind_address: String,
}

impl RegistryStore {
    /// Creates a store rooted at `config_dir` with the default layout.
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        let config_dir = config_dir.as_ref();
        Self {
            path: config_dir.join(REGISTRY_FILE),
            apps_dir: config_dir.join(APPS_DIR),
            range: PortRange::default(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }

    /// Overrides the registry file name, keeping it in the same directory.
    pub fn with_registry_file(mut self, file_name: &str) -> Self {
        self.path.set_file_name(file_name);
        self
    }

    /// Overrides the descriptor directory used for recovery.
    pub fn with_apps_dir<P: Into<PathBuf>>(mut self, apps_dir: P) -> Self {
        self.apps_dir = apps_dir.into();
        self
    }

    /// Overrides the allocatable port range.
    pub fn with_range(mut self, range: PortRange) -> Self {
        self.range = range;
        self
    }

    /// Overrides the bind address recovery looks for.
    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    /// Path of the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the descriptor directory.
    pub fn apps_dir(&self) -> &Path {
        &self.apps_dir
    }

    /// Loads the registry, rebuilding it from descriptors if the file is
    /// missing.
    ///
    /// # Errors
    ///
    /// - `RegistryError::Storage` if the file exists but cannot be read, or
    ///   the descriptor directory cannot be listed during recovery
    /// - `RegistryError::Serialization` if the file is not a valid registry
    /// - `RegistryError::Corrupt` if the stored allocations break uniqueness
    ///   or fall outside the configured range
    pub fn load(&self) -> Result<PortRegistry> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %self.path.display(),
                    "port registry not found, recovering from descriptors"
                );
                return PortScanner::new(&self.bind_address, self.range).scan(&self.apps_dir);
            }
            Err(e) => return Err(RegistryError::storage(&self.path, e)),
        };

        let mut registry: PortRegistry = serde_json::from_slice(&bytes)?;
        registry.set_range(self.range);
        registry.check()?;

        debug!(
            path = %self.path.display(),
            allocations = registry.len(),
            next_port = registry.next_port(),
            "loaded port registry"
        );
        Ok(registry)
    }

    /// Writes the full registry, replacing whatever was stored.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Storage` if the temporary file cannot be
    /// written or renamed into place.
    pub fn save(&self, registry: &PortRegistry) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(registry)?;
        json.push(b'\n');
        write_atomic(&self.path, &json)?;

        debug!(path = %self.path.display(), allocations = registry.len(), "saved port registry");
        Ok(())
    }

    /// Takes the exclusive advisory lock guarding Load→Allocate→Save.
    ///
    /// Blocks until any other holder releases it. The lock is released when
    /// the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Lock` if the lock target cannot be created,
    /// opened or locked.
    pub fn lock(&self) -> Result<RegistryLock> {
        let lock_path = self.lock_path();
        let lock_err = |source| RegistryError::Lock {
            path: lock_path.clone(),
            source,
        };

        let file = open_lock_target(&lock_path).map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;

        debug!(path = %lock_path.display(), "acquired registry lock");
        Ok(RegistryLock {
            file,
            path: lock_path,
        })
    }

    /// Path the advisory lock is taken on: the directory holding the
    /// registry, so that locking leaves nothing behind to be committed.
    #[cfg(unix)]
    pub fn lock_path(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Path the advisory lock is taken on: a `.lock` sibling of the registry.
    #[cfg(not(unix))]
    pub fn lock_path(&self) -> PathBuf {
        let mut lock_name = self.path.as_os_str().to_owned();
        lock_name.push(".lock");
        PathBuf::from(lock_name)
    }
}

#[cfg(unix)]
fn open_lock_target(dir: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(dir)?;
    File::open(dir)
}

#[cfg(not(unix))]
fn open_lock_target(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

/// Guard for the registry's advisory lock.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "released registry lock");
    }
}

/// Replaces `path` with `contents` via a temporary file and rename.
///
/// Missing parent directories are created. The replacement keeps the
/// permissions of the file it replaces; a new file is created `0644` minus
/// the process umask.
///
/// # Errors
///
/// Returns `RegistryError::Storage` naming `path` on any failure.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| RegistryError::storage(parent, e))?;

    let mut tmp = temp_file_for(path, parent).map_err(|e| RegistryError::storage(path, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RegistryError::storage(path, e))?;
    tmp.persist(path)
        .map_err(|e| RegistryError::storage(path, e.error))?;

    Ok(())
}

fn temp_file_for(path: &Path, dir: &Path) -> std::io::Result<tempfile::NamedTempFile> {
    let existing = match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    let tmp = builder.tempfile_in(dir)?;

    if let Some(permissions) = existing {
        tmp.as_file().set_permissions(permissions)?;
    }
    Ok(tmp)
}
