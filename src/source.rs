//! Checkout of the pushed repository into a prepared working tree.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::GitConfig;
use crate::error::{RelayError, Result};
use crate::payload::{RepositoryReference, RevisionSpec};
use crate::runner::{CommandRunner, CommandSpec};

pub struct SourceFetcher {
    runner: Arc<dyn CommandRunner>,
    git: GitConfig,
}

impl SourceFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, git: GitConfig) -> Self {
        Self { runner, git }
    }

    /// Clone `reference` into `dest`, which must exist and be empty, and should
    /// be absolute.
    ///
    /// Commit-pinned references get a full clone followed by a checkout of the
    /// exact commit. Ref-pinned references keep the default branch checkout;
    /// the engine resolves the ref itself from the SCM descriptor.
    pub async fn fetch(&self, reference: &RepositoryReference, dest: &Path) -> Result<()> {
        info!("Cloning {}@{}", reference.clone_url, reference.revision);

        let mut clone = CommandSpec::new(&self.git.binary).arg("clone");
        if let (RevisionSpec::RefPinned(_), Some(depth)) =
            (&reference.revision, self.git.shallow_depth)
        {
            clone = clone.arg("--depth").arg(depth.to_string());
        }
        let mut clone = clone
            .arg("--")
            .arg(&reference.clone_url)
            .arg(dest.to_string_lossy());
        // `dest` is passed as given, so run from its parent rather than from
        // inside it.
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            clone = clone.current_dir(parent);
        }

        self.run_git(
            &clone,
            format!(
                "failed to clone repository '{}' into {}",
                reference.clone_url,
                dest.display()
            ),
        )
        .await?;

        if let RevisionSpec::CommitPinned(commit) = &reference.revision {
            let checkout = CommandSpec::new(&self.git.binary)
                .args(["checkout", "--detach", commit.as_str()])
                .current_dir(dest);
            self.run_git(&checkout, format!("failed to checkout commit '{}'", commit))
                .await?;
        }

        info!("Clone succeeded");
        Ok(())
    }

    async fn run_git(&self, spec: &CommandSpec, operation: String) -> Result<()> {
        let output = self
            .runner
            .run(spec)
            .await
            .map_err(|e| RelayError::Source {
                operation: operation.clone(),
                output: e.to_string(),
            })?;
        if output.success() {
            Ok(())
        } else {
            Err(RelayError::Source {
                operation,
                output: output.combined,
            })
        }
    }
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
