//! Subprocess boundary.
//!
//! `CommandRunner` takes an `Invocation` (program, argv, optional stdin) and
//! returns the captured `CommandOutput`. `KubectlRunner` is the real
//! implementation on top of `tokio::process`; tests substitute a recording mock.

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Exact shape of one subprocess execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the child's stdin, then stdin is closed.
    pub stdin: Option<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        f.write_str(&shell_words::join(words))?;
        if let Some(input) = &self.stdin {
            write!(f, " <stdin:{} bytes>", input.len())?;
        }
        Ok(())
    }
}

/// Captured result of a finished subprocess.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Failures that happen before a subprocess produces an exit status.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// `program` may be a wrapper (`minikube kubectl --`); the message names kubectl.
    #[error("kubectl timed out after {after:?}")]
    TimedOut { program: String, after: Duration },
}

/// Capability: run one command to completion.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<CommandOutput, RunError>> + Send;
}

/// Runs invocations as real child processes.
///
/// Children are spawned with `kill_on_drop`, so dropping the request future
/// (client cancellation, server shutdown, timeout) kills the child.
#[derive(Clone, Debug, Default)]
pub struct KubectlRunner {
    timeout: Option<Duration>,
}

impl KubectlRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for KubectlRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError> {
        let started = Instant::now();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        tracing::trace!(pid = ?child.id(), "spawned {}", invocation.program);

        // Feed stdin from a separate task so a child that writes a lot before
        // reading everything cannot deadlock against us.
        if let (Some(input), Some(mut pipe)) = (invocation.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    tracing::debug!("stdin write to child failed: {e}");
                }
                // pipe dropped here -> EOF for the child
            });
        }

        let waited = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, waited).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(RunError::TimedOut {
                        program: invocation.program.clone(),
                        after: limit,
                    });
                }
            },
            None => waited.await,
        }
        .map_err(|source| RunError::Wait {
            program: invocation.program.clone(),
            source,
        })?;

        let out = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        tracing::debug!(
            exit_code = ?out.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{} finished",
            invocation.program
        );
        Ok(out)
    }
}
