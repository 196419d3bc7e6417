// ABOUTME: The local dispatch loop: enumerate, execute the ready set under a
// ABOUTME: bounded worker pool, ingest reports, repeat until quiescent

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::error::{EngineError, Result};
use super::report::{ReportEntry, ReportHeader};
use super::runner::{InvocationRunner, LocalRunner, PreparedInvocation};
use super::sandbox::stage_in_manifest;
use crate::codegen::assemble_script;
use crate::dag::{check_complete, enumerate, InvocationId, WorkflowGraph};

/// Drives a workflow graph to completion against a local build root.
///
/// Each pass executes the whole ready set concurrently (the invocations are
/// mutually independent by construction: pure functions of already-bound data
/// writing into disjoint signature-keyed sandboxes); binding results back into
/// the graph stays on the driving task.
pub struct LocalDispatcher {
    build_dir: PathBuf,
    log_file: Option<PathBuf>,
    max_concurrent: usize,
    clean: bool,
}

impl LocalDispatcher {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            log_file: None,
            max_concurrent: 4,
            clean: false,
        }
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Discard cached sandbox results and start a clean run.
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn log_path(&self, run_id: &str) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.build_dir.join(format!("log_{run_id}.jsonl")))
    }

    /// Runs the dispatch loop until no invocation is ready. The first
    /// execution failure aborts the run; invocations already in flight are
    /// awaited and their results discarded.
    pub async fn run(&self, graph: &mut WorkflowGraph) -> Result<()> {
        if self.clean && self.build_dir.exists() {
            info!(dir = ?self.build_dir, "clean run requested, discarding cached results");
            tokio::fs::remove_dir_all(&self.build_dir)
                .await
                .map_err(|e| EngineError::io("removing build root", e))?;
        }
        tokio::fs::create_dir_all(&self.build_dir)
            .await
            .map_err(|e| EngineError::io("creating build root", e))?;

        let runner = LocalRunner::new(&self.build_dir);
        let log_path = self.log_path(graph.run_id());
        let mut pass = 0usize;

        loop {
            enumerate(graph)?;

            let ready = graph.ready_invocations();
            if ready.is_empty() {
                break;
            }
            pass += 1;
            info!(pass, count = ready.len(), "dispatching ready invocations");

            let prepared = ready
                .iter()
                .map(|&id| prepare(graph, id))
                .collect::<Result<Vec<_>>>()?;

            let reports = self.execute_all(&runner, &prepared).await?;

            for (prep, entries) in prepared.iter().zip(reports) {
                ingest(graph, prep, &entries)?;
                append_log(&log_path, &entries).await?;
            }
        }

        check_complete(graph)?;
        info!(passes = pass, "dispatch loop quiescent, workflow complete");
        Ok(())
    }

    /// Executes one pass's ready set under the concurrency bound.
    async fn execute_all(
        &self,
        runner: &dyn InvocationRunner,
        prepared: &[PreparedInvocation],
    ) -> Result<Vec<Vec<ReportEntry>>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let futures: Vec<_> = prepared
            .iter()
            .map(|prep| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    debug!(task = %prep.header.task_name, signature = %prep.signature, "executing");
                    runner.execute(prep).await
                }
            })
            .collect();

        let mut out = Vec::with_capacity(prepared.len());
        for result in future::join_all(futures).await {
            out.push(result?);
        }
        Ok(out)
    }
}

/// Captures everything an invocation needs off the graph so execution can
/// proceed without touching shared state.
fn prepare(graph: &WorkflowGraph, id: InvocationId) -> Result<PreparedInvocation> {
    let invocation = graph.invocation(id);

    let signature = invocation.signature(graph).map_err(|_| {
        EngineError::Inconsistent(format!("ready invocation {id} lost its signature"))
    })?;
    let script = assemble_script(graph, invocation).map_err(|_| {
        EngineError::Inconsistent(format!("ready invocation {id} cannot render its script"))
    })?;
    let stage_ins = stage_in_manifest(graph, invocation).map_err(|_| {
        EngineError::Inconsistent(format!("ready invocation {id} cannot stage its inputs"))
    })?;

    Ok(PreparedInvocation {
        id,
        signature: signature.clone(),
        script,
        stage_ins,
        header: ReportHeader {
            run_id: graph.run_id().to_string(),
            task_id: invocation.task_node().index(),
            invoc_id: signature,
            task_name: invocation.task_name().to_string(),
            lang: invocation.language().label().to_string(),
        },
    })
}

/// Binds every declared output of the invocation from its report's
/// `invoc-output` payload. This is what unblocks the enumerator.
fn ingest(
    graph: &mut WorkflowGraph,
    prepared: &PreparedInvocation,
    entries: &[ReportEntry],
) -> Result<()> {
    let task_name = graph.invocation(prepared.id).task_name().to_string();
    let output_names: Vec<String> = graph
        .prototype_by_name(&task_name)
        .map_err(EngineError::Dag)?
        .outputs
        .iter()
        .map(|o| o.name.clone())
        .collect();

    for entry in entries {
        let Some(payload) = entry.output_payload() else {
            continue;
        };

        for name in &output_names {
            let values = payload
                .get(name)
                .ok_or_else(|| EngineError::ReportMissingOutput {
                    task: task_name.clone(),
                    output: name.clone(),
                })?;

            let values: Vec<String> = values
                .as_array()
                .ok_or_else(|| EngineError::ReportMalformedOutput {
                    task: task_name.clone(),
                    output: name.clone(),
                })?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| EngineError::ReportMalformedOutput {
                            task: task_name.clone(),
                            output: name.clone(),
                        })
                })
                .collect::<Result<_>>()?;

            graph.bind_invocation_output(prepared.id, name, values)?;
        }
    }

    if !graph.invocation(prepared.id).is_computed() {
        return Err(EngineError::Inconsistent(format!(
            "invocation {} produced no output report",
            prepared.signature
        )));
    }
    Ok(())
}

async fn append_log(path: &Path, entries: &[ReportEntry]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    if entries.is_empty() {
        return Ok(());
    }

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| EngineError::io(format!("opening run log {path:?}"), e))?;

    for entry in entries {
        file.write_all(entry.to_line().as_bytes())
            .await
            .map_err(|e| EngineError::io("appending to run log", e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| EngineError::io("appending to run log", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_defaults_under_build_root() {
        let d = LocalDispatcher::new("/tmp/build");
        assert_eq!(
            d.log_path("r-1"),
            PathBuf::from("/tmp/build/log_r-1.jsonl")
        );

        let d = d.with_log_file("/var/log/wf.jsonl");
        assert_eq!(d.log_path("r-1"), PathBuf::from("/var/log/wf.jsonl"));
    }

    #[test]
    fn test_concurrency_floor_is_one() {
        let d = LocalDispatcher::new("/tmp/build").with_max_concurrent(0);
        assert_eq!(d.max_concurrent, 1);
    }
}
