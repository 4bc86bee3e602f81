//! Narrow subprocess capability shared by the source fetcher and the
//! pipeline runner, so both can be exercised without real binaries.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A program, its arguments and the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// stdout and stderr interleaved line by line in arrival order.
    pub combined: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Only a failure to start the process is an error;
    /// a non-zero exit is reported through [`CommandOutput::exit_code`].
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        match &spec.cwd {
            Some(cwd) => info!("Running (cwd = '{}'): {}", cwd.display(), spec),
            None => info!("Running: {}", spec),
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (out, err, combined) = tokio::join!(
            forward_lines(stdout, tx.clone()),
            forward_lines(stderr, tx),
            collect_lines(rx, &spec.program),
        );
        if let Err(e) = out.and(err) {
            // Reap the child before giving up on it.
            if let Err(kill_err) = child.kill().await {
                warn!("Failed to stop {}: {}", spec.program, kill_err);
            }
            return Err(e);
        }

        let status = child.wait().await?;
        Ok(CommandOutput {
            exit_code: status.code(),
            combined,
        })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if tx.send(line).is_err() {
            return Ok(());
        }
    }
}

async fn collect_lines(mut rx: mpsc::UnboundedReceiver<String>, program: &str) -> String {
    let mut combined = String::new();
    while let Some(line) = rx.recv().await {
        debug!("[{}] {}", program, line.trim_end());
        combined.push_str(&line);
    }
    combined
}

/// Test double that records every command and replays canned results.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        calls: Mutex<Vec<CommandSpec>>,
        results: Mutex<VecDeque<io::Result<CommandOutput>>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Queue the result of the next command. Unscripted commands succeed
        /// with no output.
        pub(crate) fn then_exit(self, code: i32, output: &str) -> Self {
            self.results.lock().unwrap().push_back(Ok(CommandOutput {
                exit_code: Some(code),
                combined: output.to_string(),
            }));
            self
        }

        pub(crate) fn then_spawn_error(self, kind: io::ErrorKind) -> Self {
            self.results
                .lock()
                .unwrap()
                .push_back(Err(io::Error::new(kind, "spawn failed")));
            self
        }

        pub(crate) fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(CommandOutput {
                        exit_code: Some(0),
                        combined: String::new(),
                    })
                })
        }
    }
}
