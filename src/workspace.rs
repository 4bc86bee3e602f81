//! On-disk directories owned by one job at a time.

use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::config::WorkspaceConfig;
use crate::error::{RelayError, Result};

pub const WORK_DIR_NAME: &str = "workspace";
pub const ENGINE_HOME_DIR_NAME: &str = "jenkinshome";
pub const RUN_DIR_NAME: &str = "temp";
pub const DESCRIPTOR_FILE_NAME: &str = "scm.yaml";

const JOB_DIR_PREFIX: &str = "relay-";

/// How job directories are placed under the base directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    /// `<base>/relay-<job>/...`; concurrent jobs never share a path.
    #[default]
    PerJob,
    /// `<base>/...` for every job; only one job may run at a time.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWorkspace {
    pub root: PathBuf,
    /// Checked-out working tree.
    pub work_dir: PathBuf,
    /// Build engine home; also holds the SCM descriptor.
    pub engine_home: PathBuf,
    /// Transient run workspace handed to the engine.
    pub run_dir: PathBuf,
}

impl JobWorkspace {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            work_dir: root.join(WORK_DIR_NAME),
            engine_home: root.join(ENGINE_HOME_DIR_NAME),
            run_dir: root.join(RUN_DIR_NAME),
            root,
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.engine_home.join(DESCRIPTOR_FILE_NAME)
    }

    fn job_dirs(&self) -> [&Path; 3] {
        [&self.work_dir, &self.engine_home, &self.run_dir]
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
    mode: WorkspaceMode,
}

impl WorkspaceManager {
    /// A relative `base_dir` is resolved against the current directory once,
    /// here, so every path handed to child processes is absolute.
    pub fn new(base_dir: impl Into<PathBuf>, mode: WorkspaceMode) -> Result<Self> {
        let base_dir = base_dir.into();
        let base_dir =
            std::path::absolute(&base_dir).map_err(|e| RelayError::filesystem(&base_dir, e))?;
        Ok(Self { base_dir, mode })
    }

    pub fn from_config(config: &WorkspaceConfig) -> Result<Self> {
        Self::new(config.base_dir.clone(), config.mode)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn mode(&self) -> WorkspaceMode {
        self.mode
    }

    /// Directory layout for the job identified by `job_key`.
    pub fn layout_for(&self, job_key: &str) -> JobWorkspace {
        match self.mode {
            WorkspaceMode::PerJob => {
                JobWorkspace::at(self.base_dir.join(format!("{}{}", JOB_DIR_PREFIX, job_key)))
            }
            WorkspaceMode::Shared => JobWorkspace::at(&self.base_dir),
        }
    }

    /// Reset every job directory to an empty state. Safe to repeat: a missing
    /// path is not an error, and nothing from a previous run survives.
    pub async fn prepare(&self, workspace: &JobWorkspace) -> Result<()> {
        if self.mode == WorkspaceMode::PerJob {
            remove_if_present(&workspace.root).await?;
        }
        for dir in workspace.job_dirs() {
            remove_if_present(dir).await?;
            fs::create_dir_all(dir)
                .await
                .map_err(|e| RelayError::filesystem(dir, e))?;
            debug!("Created {}", dir.display());
        }
        Ok(())
    }

    /// Remove what a finished job left behind. Shared directories stay in
    /// place until the next `prepare` resets them.
    pub async fn cleanup(&self, workspace: &JobWorkspace) -> Result<()> {
        match self.mode {
            WorkspaceMode::PerJob => remove_if_present(&workspace.root).await,
            WorkspaceMode::Shared => {
                debug!("Keeping shared workspace {}", workspace.root.display());
                Ok(())
            }
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RelayError::filesystem(path, e)),
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
