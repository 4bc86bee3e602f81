//! Asynchronous consumer: one bus message in, one pipeline attempt out.
//!
//! Stages run strictly in order and the first failure ends the job. Nothing
//! is retried here; retryable failures are handed back to the bus.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Instrument, error, info, info_span, warn};

use crate::bus::{BusMessage, MessageId, Subscription};
use crate::config::RelayConfig;
use crate::descriptor::write_descriptor;
use crate::error::RelayError;
use crate::payload;
use crate::pipeline::{PipelineExecutionResult, PipelineRunner};
use crate::runner::CommandRunner;
use crate::source::SourceFetcher;
use crate::workspace::{JobWorkspace, WorkspaceManager, WorkspaceMode};

/// Milestones of a job, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Validated,
    WorkspacePrepared,
    SourceFetched,
    DescriptorWritten,
    PipelineExecuted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::WorkspacePrepared => "workspace_prepared",
            Stage::SourceFetched => "source_fetched",
            Stage::DescriptorWritten => "descriptor_written",
            Stage::PipelineExecuted => "pipeline_executed",
        };
        f.write_str(name)
    }
}

/// Terminal state of a job.
#[derive(Debug)]
pub enum JobState {
    PipelineExecuted(PipelineExecutionResult),
    /// `stage` is the milestone that could not be reached.
    Failed { stage: Stage, error: RelayError },
}

impl JobState {
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::PipelineExecuted(_))
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            JobState::Failed { stage, .. } => Some(*stage),
            JobState::PipelineExecuted(_) => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, JobState::Failed { error, .. } if error.is_retryable())
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub message_id: MessageId,
    pub delivery_attempt: u32,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

pub struct Worker {
    config: Arc<RelayConfig>,
    workspaces: WorkspaceManager,
    fetcher: SourceFetcher,
    pipeline: PipelineRunner,
    /// Held for the whole job when every job shares one set of directories.
    job_execution_lock: Mutex<()>,
}

impl Worker {
    pub fn new(
        config: Arc<RelayConfig>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, RelayError> {
        Ok(Self {
            workspaces: WorkspaceManager::from_config(&config.workspace)?,
            fetcher: SourceFetcher::new(runner.clone(), config.git.clone()),
            pipeline: PipelineRunner::new(runner, config.engine.clone()),
            job_execution_lock: Mutex::new(()),
            config,
        })
    }

    /// Consume messages until the topic closes.
    pub async fn run(&self, mut subscription: Subscription) {
        info!("Worker consuming topic '{}'", subscription.topic());
        while let Some(message) = subscription.recv().await {
            let report = self.process(&message).await;
            if report.state.is_retryable() {
                subscription.redeliver(message);
            }
        }
        info!("Topic '{}' closed; worker stopped", subscription.topic());
    }

    /// Drive one message through every stage and report where it ended.
    pub async fn process(&self, message: &BusMessage) -> JobReport {
        let span = info_span!(
            "job",
            message_id = %message.id,
            attempt = message.delivery_attempt
        );
        async move {
            let started_at = Utc::now();
            let _guard = match self.workspaces.mode() {
                WorkspaceMode::Shared => Some(self.job_execution_lock.lock().await),
                WorkspaceMode::PerJob => None,
            };

            let workspace = self.workspaces.layout_for(&message.id.to_string());
            let state = match self.execute(message, &workspace).await {
                Ok(result) => {
                    info!("Job {} completed.", message.id);
                    JobState::PipelineExecuted(result)
                }
                Err((stage, error)) => {
                    error!("Job {} failed at {}: {}", message.id, stage, error);
                    JobState::Failed { stage, error }
                }
            };

            if state.failed_stage() != Some(Stage::Validated) {
                self.finish(&workspace).await;
            }

            JobReport {
                message_id: message.id,
                delivery_attempt: message.delivery_attempt,
                state,
                started_at,
                finished_at: Utc::now(),
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        message: &BusMessage,
        workspace: &JobWorkspace,
    ) -> Result<PipelineExecutionResult, (Stage, RelayError)> {
        reached(Stage::Received);
        let reference = payload::parse(&message.body, self.config.payload.revision)
            .map_err(|e| (Stage::Validated, RelayError::from(e)))?;
        reached(Stage::Validated);

        self.workspaces
            .prepare(workspace)
            .await
            .map_err(|e| (Stage::WorkspacePrepared, e))?;
        reached(Stage::WorkspacePrepared);

        self.fetcher
            .fetch(&reference, &workspace.work_dir)
            .await
            .map_err(|e| (Stage::SourceFetched, e))?;
        reached(Stage::SourceFetched);

        let descriptor = write_descriptor(
            &reference,
            &self.config.git.tool_path,
            &workspace.descriptor_path(),
        )
        .await
        .map_err(|e| (Stage::DescriptorWritten, e))?;
        reached(Stage::DescriptorWritten);

        let descriptor = self
            .config
            .engine
            .pass_scm_descriptor
            .then_some(descriptor.as_path());
        let result = self
            .pipeline
            .run(workspace, descriptor)
            .await
            .map_err(|e| (Stage::PipelineExecuted, e))?;
        reached(Stage::PipelineExecuted);

        Ok(result)
    }

    async fn finish(&self, workspace: &JobWorkspace) {
        if !self.config.workspace.cleanup_on_finish {
            return;
        }
        if let Err(e) = self.workspaces.cleanup(workspace).await {
            warn!("Failed to clean up {}: {}", workspace.root.display(), e);
        }
    }
}

fn reached(stage: Stage) {
    info!(stage = %stage, "Stage reached");
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
