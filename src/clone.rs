//! Cloning the repository an issue was opened on.
//!
//! Owner and repository names come straight from the webhook payload, so they go through
//! [`sanitize`] before being turned into a path under the configured base directory. Operations on
//! the same target directory are serialized, GitHub happily delivers the same event twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::config::CloneConfig;

mod runner;
pub use runner::{CommandError, CommandOutput, CommandRunner, Invocation, SystemRunner};

mod sanitize;
pub use sanitize::sanitize;

const GH: &str = "gh";
const GIT: &str = "git";
const VCS_MARKER: &str = ".git";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PULL_TIMEOUT: Duration = Duration::from_secs(60);
const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CloneResult {
    Cloned { path: PathBuf },
    Updated { path: PathBuf },
    AlreadyExists { path: PathBuf },
    Error { message: String },
}

impl CloneResult {
    fn error(message: impl Into<String>) -> Self {
        CloneResult::Error {
            message: message.into(),
        }
    }
}

/// One async mutex per target directory, created on demand.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // nobody else holds or waits on these
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(path.to_owned()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct Cloner {
    config: CloneConfig,
    runner: Box<dyn CommandRunner>,
    locks: PathLocks,
}

impl Cloner {
    pub fn new(config: CloneConfig, runner: impl CommandRunner + 'static) -> Self {
        Self {
            config,
            runner: Box::new(runner),
            locks: PathLocks::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Clones `full_name` into `<base_dir>/<owner>/<repo_name>`, or updates an existing checkout
    /// there if configured to.
    ///
    /// Never fails: every problem is reported as [`CloneResult::Error`].
    pub async fn clone_repository(
        &self,
        full_name: &str,
        owner: &str,
        repo_name: &str,
    ) -> CloneResult {
        let (safe_owner, safe_repo) = match (sanitize(owner), sanitize(repo_name)) {
            (Ok(owner), Ok(repo)) => (owner, repo),
            (Err(e), _) | (_, Err(e)) => {
                warn!("refusing to clone {}: {}", full_name, e);
                return CloneResult::error(format!("Invalid repository path: {}", e));
            }
        };

        if !self.tool_available().await {
            return CloneResult::error("GitHub CLI (gh) is not available");
        }

        let path = self.config.base_dir.join(safe_owner).join(safe_repo);
        let _guard = self.locks.lock(&path).await;

        let checked_out = tokio::fs::try_exists(path.join(VCS_MARKER))
            .await
            .unwrap_or(false);
        if checked_out {
            if self.config.update_existing {
                self.pull(path).await
            } else {
                debug!("{} already exists, leaving it alone", path.display());
                CloneResult::AlreadyExists { path }
            }
        } else {
            self.clone_into(full_name, path).await
        }
    }

    async fn tool_available(&self) -> bool {
        let probe = Invocation::new(GH, PROBE_TIMEOUT).arg("--version");
        match self.runner.run(probe).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("gh probe failed: {}", e);
                false
            }
        }
    }

    async fn pull(&self, path: PathBuf) -> CloneResult {
        let pull = Invocation::new(GIT, PULL_TIMEOUT)
            .arg("-C")
            .arg(&path)
            .arg("pull");

        match self.runner.run(pull).await {
            Ok(output) if output.success() => CloneResult::Updated { path },
            Ok(output) => CloneResult::error(output.failure_message(GIT)),
            Err(e) => CloneResult::error(e.to_string()),
        }
    }

    async fn clone_into(&self, full_name: &str, path: PathBuf) -> CloneResult {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return CloneResult::error(format!(
                    "couldn't create {}: {}",
                    parent.display(),
                    e
                ));
            }
        }

        // `full_name` is resolved by gh against GitHub, only the target path touches the disk
        let clone = Invocation::new(GH, CLONE_TIMEOUT)
            .arg("repo")
            .arg("clone")
            .arg(full_name)
            .arg(&path);

        match self.runner.run(clone).await {
            Ok(output) if output.success() => {
                debug!("gh output: {}", output.stdout.trim());
                info!("cloned {} into {}", full_name, path.display());
                CloneResult::Cloned { path }
            }
            Ok(output) => CloneResult::error(output.failure_message(GH)),
            Err(e) => CloneResult::error(e.to_string()),
        }
    }
}
