// src/sandbox/executor.rs — Subprocess isolation for one generated script
//
// Each request runs in a fresh scoped working directory with only the
// staged input files visible. Timeouts and memory breaches kill the whole
// process group. Script failure is a typed outcome status; only spawn and
// workdir faults propagate as errors.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{ExecutionOutcome, ExecutionRequest, OutcomeStatus};
use crate::infra::errors::AgentError;

/// Name the script is written under inside the working directory.
const SCRIPT_NAME: &str = "_agent_script.py";

/// Interval between limit checks while the child runs.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for a killed process group to be reaped and for its
/// output pipes to drain.
const REAP_GRACE: Duration = Duration::from_secs(5);

pub struct Sandbox {
    interpreter: String,
    data_dir: PathBuf,
}

impl Sandbox {
    pub fn new(interpreter: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Run one request to completion. Takes `&mut self`: exactly one
    /// request is in flight at any time.
    pub async fn execute(
        &mut self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, AgentError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| AgentError::Infrastructure(format!("cannot allocate workdir: {e}")))?;

        self.stage_inputs(workdir.path(), &request.inputs)?;

        let script_path = workdir.path().join(SCRIPT_NAME);
        std::fs::write(&script_path, &request.source)?;

        let started = Instant::now();
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(SCRIPT_NAME)
            .current_dir(workdir.path())
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::Infrastructure(format!("cannot spawn '{}': {e}", self.interpreter))
        })?;
        let pid = child.id();

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        // Wait for exit, checking wall clock and resident memory between
        // polls. On breach, the whole process group dies.
        let status = loop {
            tokio::select! {
                exit = child.wait() => {
                    let exit = exit.map_err(|e| {
                        AgentError::Infrastructure(format!("wait failed: {e}"))
                    })?;
                    break if exit.success() {
                        OutcomeStatus::Success
                    } else {
                        OutcomeStatus::RuntimeError
                    };
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if started.elapsed() >= request.budget.timeout {
                        tracing::warn!(
                            elapsed_secs = started.elapsed().as_secs(),
                            "Script exceeded timeout, killing process group"
                        );
                        kill_group(&mut child, pid).await;
                        break OutcomeStatus::Timeout;
                    }
                    if let Some(rss) = pid.and_then(resident_bytes) {
                        if rss > request.budget.memory_ceiling_bytes {
                            tracing::warn!(
                                rss_mb = rss / (1024 * 1024),
                                "Script exceeded memory ceiling, killing process group"
                            );
                            kill_group(&mut child, pid).await;
                            break OutcomeStatus::ResourceExceeded;
                        }
                    }
                }
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let duration = started.elapsed();

        // Collect produced files on every path so partial progress stays
        // inspectable, then the workdir is torn down by TempDir drop.
        let artifacts = self.collect_artifacts(workdir.path(), &request.inputs)?;

        tracing::debug!(
            status = %status,
            duration_ms = duration.as_millis() as u64,
            artifacts = artifacts.len(),
            "Sandbox execution finished"
        );

        Ok(ExecutionOutcome {
            status,
            stdout,
            stderr,
            artifacts,
            score: None,
            duration,
        })
    }

    /// Copy requested input files from the data directory into the
    /// scoped working directory. Missing inputs are skipped: a prior
    /// degraded phase may not have produced its artifact.
    fn stage_inputs(&self, workdir: &Path, inputs: &[String]) -> Result<(), AgentError> {
        for name in inputs {
            let src = self.data_dir.join(name);
            if !src.is_file() {
                tracing::debug!(input = %name, "Staged input missing, skipping");
                continue;
            }
            std::fs::copy(&src, workdir.join(name))?;
        }
        Ok(())
    }

    /// Move files the script created or rewrote back into the data
    /// directory, so a later request can stage them forward explicitly.
    /// Returns their names in sorted order. A staged input counts only
    /// when its content no longer matches the data-directory copy —
    /// scripts routinely rewrite `train_fe.csv` or `submission.csv`, and
    /// those rewrites must flow forward to later executions.
    fn collect_artifacts(
        &self,
        workdir: &Path,
        inputs: &[String],
    ) -> Result<Vec<String>, AgentError> {
        let mut produced = Vec::new();
        for entry in std::fs::read_dir(workdir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == SCRIPT_NAME {
                continue;
            }
            let dest = self.data_dir.join(&name);
            if inputs.iter().any(|i| i == &name) && !file_changed(&entry.path(), &dest)? {
                continue;
            }
            std::fs::copy(entry.path(), dest)?;
            produced.push(name);
        }
        produced.sort();
        Ok(produced)
    }
}

/// Whether a workdir file's content differs from its data-directory
/// counterpart. A missing counterpart counts as changed.
fn file_changed(workdir_file: &Path, data_file: &Path) -> Result<bool, AgentError> {
    if !data_file.is_file() {
        return Ok(true);
    }
    let a = std::fs::metadata(workdir_file)?.len();
    let b = std::fs::metadata(data_file)?.len();
    if a != b {
        return Ok(true);
    }
    Ok(std::fs::read(workdir_file)? != std::fs::read(data_file)?)
}

/// Kill the child's process group, then reap the child itself.
async fn kill_group(child: &mut tokio::process::Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // Negative pid targets the whole group, catching any
        // grandchildren the script spawned.
        let _ = std::process::Command::new("kill")
            .args(["-KILL", &format!("-{pid}")])
            .status();
    }
    let _ = child.start_kill();
    let _ = tokio::time::timeout(REAP_GRACE, child.wait()).await;
}

/// Await a pipe-reader task, tolerating a stuck pipe after a group kill.
async fn drain(task: tokio::task::JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(REAP_GRACE, task).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        _ => String::new(),
    }
}

/// Resident set size of a process, from /proc on Linux.
#[cfg(target_os = "linux")]
fn resident_bytes(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes(_pid: u32) -> Option<u64> {
    None
}
