//! Secret-encryption collaborator.
//!
//! Encryption is delegated to `agenix -e <secret>` run from the repository
//! root, where the tool finds `secrets.nix`.

use crate::process::{CommandRunner, Input};
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Drives the external encryption tool.
#[derive(Debug, Clone)]
pub struct SecretEncryptor {
    program: String,
    repo_root: PathBuf,
    runner: CommandRunner,
}

impl SecretEncryptor {
    /// Creates an encryptor running `program` from `repo_root`.
    pub fn new(program: impl Into<String>, repo_root: impl Into<PathBuf>, runner: CommandRunner) -> Self {
        Self {
            program: program.into(),
            repo_root: repo_root.into(),
            runner,
        }
    }

    /// Encrypts the plaintext at `source` into `secret_path`
    /// (repository-relative, e.g. `servers/apps/blog.age`).
    ///
    /// Returns the tool's output.
    ///
    /// # Errors
    ///
    /// `RolloutError::CommandFailed` carries the tool's output when it exits
    /// non-zero.
    pub async fn encrypt_file(&self, secret_path: &str, source: &Path) -> Result<String> {
        info!(source = %source.display(), secret = secret_path, "encrypting secret");

        let out = self
            .runner
            .capture(&self.program, &["-e", secret_path], &self.repo_root, Input::File(source))
            .await?
            .checked()?;

        Ok(out.output)
    }

    /// Opens the tool's editor on `secret_path` with the terminal attached.
    pub async fn edit(&self, secret_path: &str) -> Result<()> {
        info!(secret = secret_path, "opening secret editor");
        self.runner
            .interactive(&self.program, &["-e", secret_path], &self.repo_root)
            .await
    }
}
