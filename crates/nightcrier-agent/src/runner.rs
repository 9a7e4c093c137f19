/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-agent/src/runner.rs
*
* Launches the external agent script as a sandboxed subprocess, captures
* its combined output, enforces a deadline, and classifies the result into
* an `AgentRunResult`. The script itself is an opaque executable contract:
* this runner only `exec`s it and observes exit code plus the artifact it
* is expected to leave behind.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use nightcrier_model::{AgentRunResult, AgentRunStatus, ClusterPermissions, FaultEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::workspace::Workspace;

/// Everything the runner needs threaded through to the agent script
/// verbatim, per the outbound-subprocess contract.
#[derive(Debug, Clone)]
pub struct AgentRunConfig {
    pub agent_script_path: PathBuf,
    pub agent_cli: String,
    pub agent_image: String,
    pub agent_model: String,
    pub agent_allowed_tools: String,
    pub system_prompt_path: PathBuf,
    pub api_key_secret: Option<String>,
    pub verbosity: String,
    pub kubeconfig_mount: PathBuf,
    pub agent_timeout: Duration,
    pub timeout_buffer: Duration,
    pub wait_delay: Duration,
    pub investigation_min_size_bytes: u64,
}

pub struct AgentRunner {
    config: AgentRunConfig,
}

impl AgentRunner {
    pub fn new(config: AgentRunConfig) -> Self {
        Self { config }
    }

    /// Runs the agent against `workspace`, returning its classified
    /// result. `shutdown` resolving before the child exits is treated as a
    /// cancellation rather than a timeout.
    pub async fn run(
        &self,
        incident_id: Uuid,
        event: &FaultEvent,
        permissions: &ClusterPermissions,
        workspace: &Workspace,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<AgentRunResult> {
        let started_at = Utc::now();

        let mut command = Command::new(&self.config.agent_script_path);
        command
            .arg(build_prompt(event))
            .env("NIGHTCRIER_LLM_BACKEND", &self.config.agent_cli)
            .env("NIGHTCRIER_AGENT_IMAGE", &self.config.agent_image)
            .env("NIGHTCRIER_AGENT_MODEL", &self.config.agent_model)
            .env("NIGHTCRIER_TIMEOUT_SECONDS", self.config.agent_timeout.as_secs().to_string())
            .env("NIGHTCRIER_WORKSPACE", workspace.root())
            .env("NIGHTCRIER_KUBECONFIG", &self.config.kubeconfig_mount)
            .env("NIGHTCRIER_ALLOWED_TOOLS", &self.config.agent_allowed_tools)
            .env("NIGHTCRIER_SYSTEM_PROMPT", &self.config.system_prompt_path)
            .env("NIGHTCRIER_VERBOSITY", &self.config.verbosity)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(workspace.root());

        if let Some(secret) = &self.config.api_key_secret {
            command.env("NIGHTCRIER_API_KEY_SECRET", secret);
        }

        place_in_new_process_group(&mut command);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn agent script {:?}", self.config.agent_script_path))?;

        let pid = child.id().context("spawned child has no pid")?;
        let mut stdout = child.stdout.take().context("child has no stdout handle")?;
        let mut stderr = child.stderr.take().context("child has no stderr handle")?;

        let debug_logs = workspace.logs_dir();
        let deadline = self.config.agent_timeout + self.config.timeout_buffer;

        let run_fut = async {
            let mut out_buf = Vec::new();
            let mut err_buf = Vec::new();
            let (_, _, status) = tokio::join!(
                stdout.read_to_end(&mut out_buf),
                stderr.read_to_end(&mut err_buf),
                child.wait(),
            );
            (status, out_buf, err_buf)
        };

        tokio::pin!(run_fut);
        let wait_delay = self.config.wait_delay;

        let outcome = tokio::select! {
            biased;
            _ = shutdown => {
                warn!(incident = %incident_id, "shutdown signal received, cancelling agent run");
                terminate_process_group(pid, wait_delay).await;
                RunOutcome::Cancelled
            }
            result = timeout(deadline, &mut run_fut) => {
                match result {
                    Ok((status, out, err)) => RunOutcome::Completed(status, out, err),
                    Err(_) => {
                        warn!(incident = %incident_id, "agent run exceeded deadline {:?}", deadline);
                        terminate_process_group(pid, wait_delay).await;
                        RunOutcome::TimedOut
                    }
                }
            }
        };

        let ended_at = Utc::now();

        let (exit_code, status, failure_reason, stdout_bytes, stderr_bytes) = match outcome {
            RunOutcome::Cancelled => (None, AgentRunStatus::Cancelled, None, Vec::new(), Vec::new()),
            RunOutcome::TimedOut => (None, AgentRunStatus::Timeout, None, Vec::new(), Vec::new()),
            RunOutcome::Completed(status, out, err) => {
                let exit_code = status.as_ref().ok().and_then(|s| s.code());
                let exited_zero = status.as_ref().map(|s| s.success()).unwrap_or(false);
                let investigation = workspace.investigation_path();
                let artifact_size = tokio::fs::metadata(&investigation).await.ok().map(|m| m.len());

                let (status, reason) = classify(exited_zero, artifact_size, self.config.investigation_min_size_bytes);
                (exit_code, status, reason, out, err)
            }
        };

        if let Some(logs_dir) = debug_logs {
            write_debug_logs(&logs_dir, &stdout_bytes, &stderr_bytes).await;
        }

        let artifact_path = workspace.investigation_path();
        let (artifact_path, artifact_size_bytes) = match tokio::fs::metadata(&artifact_path).await {
            Ok(meta) => (Some(artifact_path), Some(meta.len())),
            Err(_) => (None, None),
        };

        debug!(incident = %incident_id, status = status.as_str(), "agent run finished");

        Ok(AgentRunResult {
            incident_id,
            exit_code,
            started_at,
            ended_at,
            artifact_path,
            artifact_size_bytes,
            status,
            failure_reason,
        })
    }
}

enum RunOutcome {
    Completed(std::io::Result<std::process::ExitStatus>, Vec<u8>, Vec<u8>),
    TimedOut,
    Cancelled,
}

fn classify(
    exited_zero: bool,
    artifact_size: Option<u64>,
    min_size: u64,
) -> (AgentRunStatus, Option<String>) {
    match artifact_size {
        Some(size) if exited_zero && size >= min_size => (AgentRunStatus::Success, None),
        Some(size) if exited_zero => (
            AgentRunStatus::AgentFailed,
            Some(format!("artifact undersized: {size} < {min_size} bytes")),
        ),
        Some(_) => (
            AgentRunStatus::AgentFailed,
            Some("nonzero exit with a present artifact".to_string()),
        ),
        None if !exited_zero => (
            AgentRunStatus::AgentFailed,
            Some("nonzero exit and missing artifact".to_string()),
        ),
        None => (
            AgentRunStatus::AgentFailed,
            Some("missing investigation artifact".to_string()),
        ),
    }
}

fn build_prompt(event: &FaultEvent) -> String {
    format!(
        "Investigate {} on cluster {} ({} {}/{}), severity {}.",
        event.fault_type,
        event.cluster_name,
        event.resource_kind,
        event.namespace,
        event.resource_name,
        event.severity.as_str()
    )
}

async fn write_debug_logs(logs_dir: &Path, stdout: &[u8], stderr: &[u8]) {
    if let Ok(mut f) = tokio::fs::File::create(logs_dir.join("agent-stdout.log")).await {
        let _ = f.write_all(stdout).await;
    }
    if let Ok(mut f) = tokio::fs::File::create(logs_dir.join("agent-stderr.log")).await {
        let _ = f.write_all(stderr).await;
    }
    if let Ok(mut f) = tokio::fs::File::create(logs_dir.join("agent-full.log")).await {
        let _ = f.write_all(b"--- stdout ---\n").await;
        let _ = f.write_all(stdout).await;
        let _ = f.write_all(b"\n--- stderr ---\n").await;
        let _ = f.write_all(stderr).await;
    }
}

#[cfg(unix)]
fn place_in_new_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn place_in_new_process_group(_command: &mut Command) {}

/// Sends SIGINT to the process group, waits up to `wait_delay`, then
/// escalates to SIGKILL if the group hasn't exited.
#[cfg(unix)]
async fn terminate_process_group(pid: u32, wait_delay: Duration) {
    unsafe {
        libc::kill(-(pid as i32), libc::SIGINT);
    }
    tokio::time::sleep(wait_delay).await;
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
async fn terminate_process_group(_pid: u32, _wait_delay: Duration) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_success_requires_zero_exit_and_min_size() {
        let (status, reason) = classify(true, Some(200), 100);
        assert_eq!(status, AgentRunStatus::Success);
        assert!(reason.is_none());
    }

    #[test]
    fn classify_undersized_artifact_is_agent_failed() {
        let (status, reason) = classify(true, Some(50), 100);
        assert_eq!(status, AgentRunStatus::AgentFailed);
        assert!(reason.unwrap().contains("undersized"));
    }

    #[test]
    fn classify_nonzero_exit_missing_artifact_is_agent_failed() {
        let (status, _) = classify(false, None, 100);
        assert_eq!(status, AgentRunStatus::AgentFailed);
    }

    #[test]
    fn classify_missing_artifact_on_zero_exit_is_agent_failed() {
        let (status, reason) = classify(true, None, 100);
        assert_eq!(status, AgentRunStatus::AgentFailed);
        assert!(reason.unwrap().contains("missing"));
    }
}
