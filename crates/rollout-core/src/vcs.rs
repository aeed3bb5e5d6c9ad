//! Version-control collaborator.
//!
//! `deploy` stages everything, commits and pushes. A commit that reports
//! "nothing to commit" is a success and skips the push.

use crate::process::{CommandRunner, Input};
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Commit message used when none is given.
pub const DEFAULT_COMMIT_MESSAGE: &str = "rollout: automated commit via deploy command";

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit was created; holds git's output.
    Committed(String),
    /// The working tree had no changes.
    NothingToCommit,
}

/// Result of a full deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Changes were committed and pushed.
    Pushed {
        /// Output of `git commit`.
        commit: String,
        /// Output of `git push`.
        push: String,
    },
    /// Nothing changed; no push was attempted.
    UpToDate,
}

/// Joins commit message paragraphs, falling back to
/// [`DEFAULT_COMMIT_MESSAGE`].
pub fn commit_message(messages: &[String]) -> String {
    if messages.is_empty() {
        DEFAULT_COMMIT_MESSAGE.to_string()
    } else {
        messages.join("\n")
    }
}

/// Git driven as a child process in a fixed repository root.
#[derive(Debug, Clone)]
pub struct Git {
    program: String,
    root: PathBuf,
    runner: CommandRunner,
}

impl Git {
    /// Creates a collaborator running `program` in `root`.
    pub fn new(program: impl Into<String>, root: impl Into<PathBuf>, runner: CommandRunner) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
            runner,
        }
    }

    /// Nearest ancestor of `start` (inclusive) that contains `.git`.
    pub fn discover_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(".git").exists())
            .map(Path::to_path_buf)
    }

    /// Repository root commands run in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `git add .`
    pub async fn add_all(&self) -> Result<String> {
        let out = self.run(&["add", "."]).await?.checked()?;
        debug!(root = %self.root.display(), "staged changes");
        Ok(out.output)
    }

    /// `git commit -m <message>`.
    ///
    /// # Errors
    ///
    /// Returns `RolloutError::CommandFailed` unless git either commits or
    /// reports that there is nothing to commit.
    pub async fn commit(&self, message: &str) -> Result<CommitOutcome> {
        let out = self.run(&["commit", "-m", message]).await?;
        if out.success() {
            info!(root = %self.root.display(), "created commit");
            return Ok(CommitOutcome::Committed(out.output));
        }
        if out.output.contains("nothing to commit") {
            info!(root = %self.root.display(), "nothing to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }
        out.checked().map(|out| CommitOutcome::Committed(out.output))
    }

    /// `git push`
    pub async fn push(&self) -> Result<String> {
        let out = self.run(&["push"]).await?.checked()?;
        info!(root = %self.root.display(), "pushed to remote");
        Ok(out.output)
    }

    /// Stages, commits and pushes. Messages become newline-separated
    /// paragraphs of one commit message.
    pub async fn deploy(&self, messages: &[String]) -> Result<DeployOutcome> {
        self.add_all().await?;
        match self.commit(&commit_message(messages)).await? {
            CommitOutcome::NothingToCommit => Ok(DeployOutcome::UpToDate),
            CommitOutcome::Committed(commit) => {
                let push = self.push().await?;
                Ok(DeployOutcome::Pushed { commit, push })
            }
        }
    }

    async fn run(&self, args: &[&str]) -> Result<crate::process::CommandOutput> {
        self.runner
            .capture(&self.program, args, &self.root, Input::Null)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn init_repo(dir: &Path) -> Git {
        for args in [
            &["init", "-q"][..],
            &["config", "user.email", "rollout@example.com"][..],
            &["config", "user.name", "rollout"][..],
            &["config", "commit.gpgsign", "false"][..],
        ] {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(dir)
                .status()
                .unwrap();
            assert!(status.success());
        }
        Git::new("git", dir, CommandRunner::new(Duration::from_secs(30), None))
    }

    #[test]
    fn test_commit_message_joining() {
        assert_eq!(commit_message(&[]), DEFAULT_COMMIT_MESSAGE);
        assert_eq!(
            commit_message(&["add blog".to_string(), "bump image".to_string()]),
            "add blog\nbump image"
        );
    }

    #[test]
    fn test_discover_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("servers/apps");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(Git::discover_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_nothing_to_commit_skips_push() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let git = init_repo(dir.path());

        // No remote is configured, so reaching the push would fail.
        let outcome = git.deploy(&[]).await.unwrap();
        assert_eq!(outcome, DeployOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_commit_creates_commit() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let git = init_repo(dir.path());
        std::fs::write(dir.path().join("ports.json"), "{}\n").unwrap();

        git.add_all().await.unwrap();
        let outcome = git.commit("add registry").await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        assert_eq!(git.commit("again").await.unwrap(), CommitOutcome::NothingToCommit);
    }

    #[tokio::test]
    async fn test_push_without_remote_fails() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let git = init_repo(dir.path());
        std::fs::write(dir.path().join("ports.json"), "{}\n").unwrap();

        let result = git.deploy(&["add registry".to_string()]).await;
        assert!(matches!(
            result,
            Err(crate::RolloutError::CommandFailed { .. })
        ));
    }
}
