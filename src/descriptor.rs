//! SCM descriptor consumed by the build engine (`--scm`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::error::{RelayError, Result};
use crate::payload::RepositoryReference;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmDescriptor {
    pub scm: ScmSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmSection {
    pub git: GitSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSection {
    pub user_remote_configs: Vec<RemoteConfig>,
    pub branches: Vec<BranchSpec>,
    pub git_tool: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub name: String,
}

impl ScmDescriptor {
    pub fn new(reference: &RepositoryReference, git_tool: &str) -> Self {
        Self {
            scm: ScmSection {
                git: GitSection {
                    user_remote_configs: vec![RemoteConfig {
                        url: reference.clone_url.clone(),
                    }],
                    branches: vec![BranchSpec {
                        name: reference.revision.as_str().to_string(),
                    }],
                    git_tool: git_tool.to_string(),
                },
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }
}

/// Serialise the descriptor for `reference` and write it to `dest`.
///
/// The file is written next to its final location and renamed into place, so
/// the engine never sees a partial descriptor.
pub async fn write_descriptor(
    reference: &RepositoryReference,
    git_tool: &str,
    dest: &Path,
) -> Result<PathBuf> {
    info!("Generating SCM configuration file ...");
    let yaml = ScmDescriptor::new(reference, git_tool).to_yaml()?;

    let file_name = dest
        .file_name()
        .ok_or_else(|| RelayError::Serialization(format!("{} is not a file path", dest.display())))?;
    let staging = dest.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    fs::write(&staging, yaml.as_bytes())
        .await
        .map_err(|e| RelayError::filesystem(&staging, e))?;
    if let Err(e) = fs::rename(&staging, dest).await {
        let _ = fs::remove_file(&staging).await;
        return Err(RelayError::filesystem(dest, e));
    }

    info!("SCM configuration file ({}) generated.", dest.display());
    Ok(dest.to_path_buf())
}
