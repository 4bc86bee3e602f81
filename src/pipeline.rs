//! Invocation of the external build engine against a prepared workspace.

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::{RelayError, Result};
use crate::runner::{CommandRunner, CommandSpec};
use crate::workspace::JobWorkspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineExecutionResult {
    pub exit_code: i32,
    pub combined_output: String,
}

pub struct PipelineRunner {
    runner: Arc<dyn CommandRunner>,
    engine: EngineConfig,
}

impl PipelineRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, engine: EngineConfig) -> Self {
        Self { runner, engine }
    }

    /// Command line for one engine run. The pipeline file is always
    /// `<work_dir>/<pipeline_file>`.
    pub fn command_for(&self, workspace: &JobWorkspace, descriptor: Option<&Path>) -> CommandSpec {
        let pipeline_file = workspace.work_dir.join(&self.engine.pipeline_file);
        let mut spec = CommandSpec::new(&self.engine.binary)
            .arg("--jenkins-war")
            .arg(self.engine.war_path.to_string_lossy())
            .arg("--plugins")
            .arg(self.engine.plugins_dir.to_string_lossy())
            .arg("--file")
            .arg(pipeline_file.to_string_lossy())
            .arg("--runWorkspace")
            .arg(workspace.run_dir.to_string_lossy())
            .arg("--jenkinsHome")
            .arg(workspace.engine_home.to_string_lossy());
        if let Some(descriptor) = descriptor {
            spec = spec.arg("--scm").arg(descriptor.to_string_lossy());
        }
        spec.current_dir(&workspace.work_dir)
    }

    /// Run the engine to completion. Any exit other than 0 is an
    /// [`RelayError::Execution`] carrying the engine output untouched.
    pub async fn run(
        &self,
        workspace: &JobWorkspace,
        descriptor: Option<&Path>,
    ) -> Result<PipelineExecutionResult> {
        let spec = self.command_for(workspace, descriptor);
        info!("Running Jenkinsfile ...");
        info!("Command: {}", spec);

        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| RelayError::Execution {
                command: spec.to_string(),
                exit_code: None,
                output: e.to_string(),
            })?;

        match output.exit_code {
            Some(0) => {
                info!("{}", output.combined);
                Ok(PipelineExecutionResult {
                    exit_code: 0,
                    combined_output: output.combined,
                })
            }
            exit_code => {
                error!(
                    "Engine exited with {:?}:\n{}",
                    exit_code, output.combined
                );
                Err(RelayError::Execution {
                    command: spec.to_string(),
                    exit_code,
                    output: output.combined,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
