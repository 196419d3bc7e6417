// ABOUTME: Executes one prepared invocation as a sandboxed subprocess with
// ABOUTME: resource-usage wrapping and concurrent stdout/stderr draining

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Instant};
use tracing::{debug, info};

use super::error::{EngineError, FailureReport, Result};
use super::report::{keys, ReportEntry, ReportHeader};
use super::sandbox::{Sandbox, StagedFile};
use crate::dag::InvocationId;

/// How long the stream readers may lag behind process exit before the run is
/// considered wedged.
const STREAM_DRAIN_TIMEOUT_SECS: u64 = 4;

/// Everything needed to execute one ready invocation, captured from the
/// graph up front so execution can run concurrently with its siblings.
#[derive(Debug, Clone)]
pub struct PreparedInvocation {
    pub id: InvocationId,
    pub signature: String,
    pub script: String,
    pub stage_ins: Vec<StagedFile>,
    pub header: ReportHeader,
}

/// The seam between the dispatch loop and whatever actually runs a sandbox.
#[async_trait]
pub trait InvocationRunner: Send + Sync {
    /// Executes to completion (or returns the cached result) and yields the
    /// sandbox's report entries.
    async fn execute(&self, prepared: &PreparedInvocation) -> Result<Vec<ReportEntry>>;
}

/// Runs invocations as local subprocesses under the build root. Wraps
/// execution with GNU time when available; otherwise records wall-clock time
/// itself so the report contract holds either way.
pub struct LocalRunner {
    build_dir: PathBuf,
    gnu_time: Option<PathBuf>,
}

impl LocalRunner {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        let gnu_time = Path::new("/usr/bin/time");
        Self {
            build_dir: build_dir.into(),
            gnu_time: gnu_time.exists().then(|| gnu_time.to_path_buf()),
        }
    }

    async fn run_script(&self, sandbox: &Sandbox, prepared: &PreparedInvocation) -> Result<()> {
        let script_path = tokio::fs::canonicalize(sandbox.script_path())
            .await
            .map_err(|e| EngineError::io("resolving script path", e))?;

        let mut command = match &self.gnu_time {
            Some(time_bin) => {
                // The child runs with the sandbox as cwd, so the report is
                // addressed by its in-sandbox name.
                let mut c = Command::new(time_bin);
                c.arg("-a")
                    .arg("-o")
                    .arg(super::sandbox::REPORT_FILENAME)
                    .arg("-f")
                    .arg(gnu_time_format(&prepared.header))
                    .arg(&script_path);
                c
            }
            None => Command::new(&script_path),
        };
        command
            .current_dir(sandbox.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| EngineError::io(format!("spawning {script_path:?}"), e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Inconsistent("child stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Inconsistent("child stderr not piped".to_string()))?;

        // Drain both pipes concurrently while waiting, otherwise a chatty
        // script deadlocks against a full OS pipe buffer.
        let stdout_task = tokio::spawn(drain(stdout));
        let stderr_task = tokio::spawn(drain(stderr));

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::io("waiting for child process", e))?;

        let (stdout_text, stderr_text) = timeout(
            Duration::from_secs(STREAM_DRAIN_TIMEOUT_SECS),
            async {
                let out = stdout_task.await;
                let err = stderr_task.await;
                (out, err)
            },
        )
        .await
        .map_err(|_| EngineError::StreamDrain(STREAM_DRAIN_TIMEOUT_SECS))
        .and_then(|(out, err)| {
            let out = out?.map_err(|e| EngineError::io("draining stdout", e))?;
            let err = err?.map_err(|e| EngineError::io("draining stderr", e))?;
            Ok((out, err))
        })?;

        if !status.success() {
            return Err(EngineError::InvocationFailed(Box::new(FailureReport {
                task_name: prepared.header.task_name.clone(),
                signature: prepared.signature.clone(),
                exit_code: status.code(),
                script: prepared.script.clone(),
                stdout: stdout_text,
                stderr: stderr_text,
            })));
        }

        let mut extra = Vec::new();
        if !stdout_text.is_empty() {
            extra.push(
                prepared
                    .header
                    .entry(keys::INVOC_STDOUT, json!(stdout_text)),
            );
        }
        if !stderr_text.is_empty() {
            extra.push(
                prepared
                    .header
                    .entry(keys::INVOC_STDERR, json!(stderr_text)),
            );
        }
        if self.gnu_time.is_none() {
            extra.push(prepared.header.entry(
                keys::INVOC_TIME,
                json!({ "realTime": started.elapsed().as_secs_f64() }),
            ));
        }
        append_entries(&sandbox.report_path(), &extra).await?;

        debug!(
            signature = %prepared.signature,
            elapsed = ?started.elapsed(),
            "subprocess completed"
        );
        Ok(())
    }
}

#[async_trait]
impl InvocationRunner for LocalRunner {
    async fn execute(&self, prepared: &PreparedInvocation) -> Result<Vec<ReportEntry>> {
        let sandbox = Sandbox::for_signature(&self.build_dir, &prepared.signature);

        if sandbox.has_success_marker() {
            info!(
                task = %prepared.header.task_name,
                signature = %prepared.signature,
                "cached result found, skipping execution"
            );
        } else {
            sandbox.reset().await?;
            sandbox.write_script(&prepared.script).await?;
            sandbox.stage_in(&self.build_dir, &prepared.stage_ins).await?;
            self.run_script(&sandbox, prepared).await?;
        }

        let entries = sandbox.read_report().await?;

        if !sandbox.has_success_marker() {
            sandbox.write_success_marker().await?;
        }

        Ok(entries)
    }
}

async fn drain(mut reader: impl AsyncReadExt + Unpin) -> std::io::Result<String> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf).await?;
    Ok(buf)
}

async fn append_entries(path: &Path, entries: &[ReportEntry]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    if entries.is_empty() {
        return Ok(());
    }

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| EngineError::io(format!("opening report {path:?}"), e))?;

    for entry in entries {
        file.write_all(entry.to_line().as_bytes())
            .await
            .map_err(|e| EngineError::io("appending report entry", e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| EngineError::io("appending report entry", e))?;
    }
    Ok(())
}

/// The GNU time format string: one complete report line whose value object
/// is filled in by time's resource-usage substitutions.
fn gnu_time_format(header: &ReportHeader) -> String {
    format!(
        "{{\"timestamp\":{},\"runId\":\"{}\",\"taskId\":{},\"invocId\":\"{}\",\"taskName\":\"{}\",\"lang\":\"{}\",\"key\":\"{}\",\"value\":{{\"realTime\":%e,\"userTime\":%U,\"sysTime\":%S,\"maxResidentSetSize\":%M,\"nMajPageFault\":%F,\"nMinPageFault\":%R,\"nIoRead\":%I,\"nIoWrite\":%O,\"nForcedContextSwitch\":%c,\"nWaitContextSwitch\":%w}}}}",
        Utc::now().timestamp_millis(),
        header.run_id,
        header.task_id,
        header.invoc_id,
        header.task_name,
        header.lang,
        keys::INVOC_TIME,
    )
}
