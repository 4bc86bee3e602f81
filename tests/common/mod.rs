#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use pipeline_relay::bus::{EventPublisher, InMemoryBus, MessageId};
use pipeline_relay::config::{FileSettings, RelayConfig, WebhookSecret};
use pipeline_relay::error::PublishError;
use pipeline_relay::runner::{CommandOutput, CommandRunner, CommandSpec};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SECRET: &str = "integration-secret";
pub const TOPIC: &str = "pipeline-events";

pub fn push_payload(clone_url: &str, git_ref: &str, after: &str) -> Bytes {
    Bytes::from(
        serde_json::json!({
            "ref": git_ref,
            "after": after,
            "repository": { "name": "repo", "clone_url": clone_url },
            "pusher": { "name": "octocat" }
        })
        .to_string(),
    )
}

pub fn relay_config(base_dir: &Path, customize: impl FnOnce(&mut FileSettings)) -> Arc<RelayConfig> {
    let mut settings = FileSettings::default();
    settings.workspace.base_dir = base_dir.to_path_buf();
    customize(&mut settings);
    Arc::new(RelayConfig::new(WebhookSecret::new(SECRET), TOPIC, settings))
}

/// Answers commands by program name; records everything it was asked to run.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<CommandSpec>>,
    scripts: Mutex<HashMap<String, VecDeque<(i32, String)>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, program: &str, exit_code: i32, output: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back((exit_code, output.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.program).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let (exit_code, combined) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&spec.program)
            .and_then(VecDeque::pop_front)
            .unwrap_or((0, String::new()));
        Ok(CommandOutput {
            exit_code: Some(exit_code),
            combined,
        })
    }
}

/// Publisher that counts calls before handing off to the real bus.
pub struct CountingPublisher {
    pub inner: Arc<InMemoryBus>,
    count: AtomicUsize,
}

impl CountingPublisher {
    pub fn new(inner: Arc<InMemoryBus>) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for CountingPublisher {
    async fn publish(&self, body: Bytes) -> Result<MessageId, PublishError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(body).await
    }
}
