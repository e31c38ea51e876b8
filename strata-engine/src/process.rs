//! Process pipeline runner
//!
//! Runs one provisioning-tool subcommand at a time inside a workspace:
//! - working directory is the deployment's workspace
//! - stdout and stderr are captured into one buffer in arrival order
//! - a non-zero exit is reported, never retried and never raised
//! - each invocation is bounded by a deadline, after which the child is killed

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use strata_core::domain::deployment::PipelineStep;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one external-tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    pub success: bool,
    /// Combined stdout/stderr, time-ordered
    pub output: String,
    /// The step exceeded its deadline and was killed
    pub timed_out: bool,
    pub exit_code: Option<i32>,
}

impl StepOutput {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            timed_out: false,
            exit_code: Some(0),
        }
    }

    pub fn failed(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            timed_out: false,
            exit_code: Some(exit_code),
        }
    }

    pub fn timed_out(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            timed_out: true,
            exit_code: None,
        }
    }
}

/// Runs provisioning-tool steps inside a workspace
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// Runs a single pipeline step with `workspace` as working directory
    async fn run(&self, workspace: &Path, step: PipelineStep) -> StepOutput;

    /// Reads the tool's current infrastructure state as JSON text
    async fn snapshot(&self, workspace: &Path) -> StepOutput;
}

/// Which streams end up in the captured output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Combined,
    StdoutOnly,
}

/// Runner that spawns the provisioning tool via `tokio::process`
#[derive(Debug, Clone)]
pub struct TerraformRunner {
    binary: String,
    step_timeout: Duration,
}

impl TerraformRunner {
    pub fn new(binary: impl Into<String>, step_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            step_timeout,
        }
    }

    /// Arguments for a pipeline step
    pub fn step_args(step: PipelineStep) -> Vec<String> {
        let args: &[&str] = match step {
            PipelineStep::Init => &["init", "-input=false", "-no-color"],
            PipelineStep::Plan => &["plan", "-input=false", "-no-color", "-out=tfplan"],
            PipelineStep::Apply => &[
                "apply",
                "-input=false",
                "-no-color",
                "-auto-approve",
                "tfplan",
            ],
            PipelineStep::Destroy => &["destroy", "-input=false", "-no-color", "-auto-approve"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }

    /// Arguments for the post-apply state read
    pub fn snapshot_args() -> Vec<String> {
        vec!["show".into(), "-json".into()]
    }

    /// Spawns the tool once and collects its output
    async fn invoke(&self, workspace: &Path, args: &[String], capture: Capture) -> StepOutput {
        debug!(
            "Executing {} {} in {}",
            self.binary,
            args.join(" "),
            workspace.display()
        );

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(workspace)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", self.binary, e);
                return StepOutput::failed(
                    -1,
                    format!("failed to start '{} {}': {}\n", self.binary, args.join(" "), e),
                );
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return StepOutput::failed(-1, "failed to capture process output\n");
        };

        let started = Instant::now();
        let mut buffer = String::new();

        let finished = tokio::time::timeout(self.step_timeout, async {
            collect_output(
                BufReader::new(stdout),
                BufReader::new(stderr),
                capture,
                &mut buffer,
            )
            .await;
            child.wait().await
        })
        .await;

        match finished {
            Ok(Ok(status)) => {
                debug!(
                    "{} {} exited with {} after {:?}",
                    self.binary,
                    args.first().map(String::as_str).unwrap_or_default(),
                    status,
                    started.elapsed()
                );
                if status.success() {
                    StepOutput::succeeded(buffer)
                } else {
                    StepOutput::failed(status.code().unwrap_or(-1), buffer)
                }
            }
            Ok(Err(e)) => {
                buffer.push_str(&format!("failed to wait for process: {}\n", e));
                StepOutput::failed(-1, buffer)
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out process: {}", e);
                }
                buffer.push_str(&format!(
                    "timed out after {}s; process killed\n",
                    self.step_timeout.as_secs_f64()
                ));
                StepOutput::timed_out(buffer)
            }
        }
    }
}

#[async_trait]
impl PipelineRunner for TerraformRunner {
    async fn run(&self, workspace: &Path, step: PipelineStep) -> StepOutput {
        self.invoke(workspace, &Self::step_args(step), Capture::Combined)
            .await
    }

    async fn snapshot(&self, workspace: &Path) -> StepOutput {
        self.invoke(workspace, &Self::snapshot_args(), Capture::StdoutOnly)
            .await
    }
}

/// Drains both streams line by line, appending in the order lines arrive
///
/// Bytes are decoded lossily so a stray non-UTF-8 byte never stops a stream
/// from being read; only EOF or a read error closes it.
async fn collect_output<O, E>(
    mut stdout: BufReader<O>,
    mut stderr: BufReader<E>,
    capture: Capture,
    buffer: &mut String,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    // Partial lines survive a lost select race inside these buffers
    let mut out_pending = Vec::new();
    let mut err_pending = Vec::new();
    let mut stdout_open = true;
    let mut stderr_open = true;

    while stdout_open || stderr_open {
        tokio::select! {
            read = stdout.read_until(b'\n', &mut out_pending), if stdout_open => {
                let (open, line) = take_line(read, &mut out_pending);
                stdout_open = open;
                if let Some(line) = line {
                    push_line(buffer, &line);
                }
            }
            read = stderr.read_until(b'\n', &mut err_pending), if stderr_open => {
                let (open, line) = take_line(read, &mut err_pending);
                stderr_open = open;
                match line {
                    Some(line) if capture == Capture::Combined => push_line(buffer, &line),
                    Some(line) => debug!("stderr: {}", line),
                    None => {}
                }
            }
        }
    }
}

/// Turns the outcome of one `read_until` into (stream still open, completed line)
fn take_line(read: std::io::Result<usize>, pending: &mut Vec<u8>) -> (bool, Option<String>) {
    let open = match read {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => {
            warn!("Failed to read process output: {}", e);
            false
        }
    };

    if pending.is_empty() {
        return (open, None);
    }

    let line = String::from_utf8_lossy(pending)
        .trim_end_matches('\n')
        .trim_end_matches('\r')
        .to_string();
    pending.clear();

    (open, Some(line))
}

fn push_line(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
}
