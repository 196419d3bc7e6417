// ABOUTME: Signature-keyed sandbox layout and the explicit stage-in manifest
// ABOUTME: Producer identity travels with each staged file, never in filenames

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::error::{EngineError, Result};
use super::report::ReportEntry;
use crate::dag::{Derivable, Invocation, NotDerivable, WorkflowGraph};

pub const SCRIPT_FILENAME: &str = "__script__";
pub const REPORT_FILENAME: &str = "__report__.jsonl";
pub const SUCCESS_FILENAME: &str = "__success__";

/// One file a sandbox needs before its body runs. `producer` is the
/// signature of the invocation whose sandbox holds the file; a value of
/// `None` means the filename points outside the build root (a workflow input)
/// and nothing is linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub filename: String,
    pub producer: Option<String>,
    pub channel: usize,
}

/// The per-invocation working directory keyed by signature. Holds the
/// generated script, the append-only report, the success marker, staged-in
/// links, and whatever the body produces.
#[derive(Debug, Clone)]
pub struct Sandbox {
    dir: PathBuf,
}

impl Sandbox {
    pub fn for_signature(build_dir: &Path, signature: &str) -> Self {
        Self {
            dir: build_dir.join(signature),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn script_path(&self) -> PathBuf {
        self.dir.join(SCRIPT_FILENAME)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILENAME)
    }

    pub fn success_path(&self) -> PathBuf {
        self.dir.join(SUCCESS_FILENAME)
    }

    /// Presence of the marker means "completed successfully, do not
    /// re-execute".
    pub fn has_success_marker(&self) -> bool {
        self.success_path().exists()
    }

    /// Removes any half-finished previous attempt and starts fresh.
    pub async fn reset(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .await
                .map_err(|e| EngineError::io(format!("removing stale sandbox {:?}", self.dir), e))?;
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::io(format!("creating sandbox {:?}", self.dir), e))?;
        Ok(())
    }

    pub async fn write_script(&self, text: &str) -> Result<()> {
        let path = self.script_path();
        fs::write(&path, text)
            .await
            .map_err(|e| EngineError::io(format!("writing script {path:?}"), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            fs::set_permissions(&path, perms)
                .await
                .map_err(|e| EngineError::io(format!("marking script {path:?} executable"), e))?;
        }
        Ok(())
    }

    /// Symlinks each staged file from its producer's sandbox. Fails fast when
    /// the producer never wrote the file it promised.
    pub async fn stage_in(&self, build_dir: &Path, files: &[StagedFile]) -> Result<()> {
        for staged in files {
            let Some(producer) = &staged.producer else {
                continue;
            };

            let src = build_dir.join(producer).join(&staged.filename);
            if !src.exists() {
                return Err(EngineError::StagingMissing {
                    filename: staged.filename.clone(),
                    producer: producer.clone(),
                });
            }

            let dest = self.dir.join(&staged.filename);
            if dest.exists() {
                continue;
            }

            #[cfg(unix)]
            fs::symlink(&src, &dest)
                .await
                .map_err(|e| EngineError::io(format!("linking {src:?} into sandbox"), e))?;

            debug!(file = %staged.filename, producer = %producer, "staged in");
        }
        Ok(())
    }

    /// Parses every non-empty line of the sandbox report.
    pub async fn read_report(&self) -> Result<Vec<ReportEntry>> {
        let path = self.report_path();
        let text = fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::io(format!("reading report {path:?}"), e))?;

        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(ReportEntry::parse_line(line)?);
        }
        Ok(entries)
    }

    pub async fn write_success_marker(&self) -> Result<()> {
        let path = self.success_path();
        fs::write(&path, b"")
            .await
            .map_err(|e| EngineError::io(format!("writing success marker {path:?}"), e))
    }
}

/// Computes the stage-in manifest of a ready invocation: every bound value
/// whose parameter is marked stage, together with its producer's signature.
pub fn stage_in_manifest(
    graph: &WorkflowGraph,
    invocation: &Invocation,
) -> Derivable<Vec<StagedFile>> {
    let proto = graph
        .prototype_by_name(invocation.task_name())
        .map_err(|_| NotDerivable)?;

    let mut manifest = Vec::new();

    for (name, resolved) in invocation.single_params() {
        if !proto.is_param_stage(name) {
            continue;
        }
        manifest.push(staged_file(graph, resolved.clone())?);
    }

    for (name, list) in invocation.reduce_params() {
        if !proto.is_param_stage(name) {
            continue;
        }
        let n = list.len(graph)?;
        for i in 0..n {
            manifest.push(staged_file(graph, list.get(graph, i)?)?);
        }
    }

    Ok(manifest)
}

fn staged_file(graph: &WorkflowGraph, resolved: crate::dag::Resolved) -> Derivable<StagedFile> {
    let filename = resolved.value(graph)?;
    match resolved.producer() {
        Some((producer, channel)) => {
            let signature = graph.invocation(producer).signature(graph)?;
            Ok(StagedFile {
                filename,
                producer: Some(signature),
                channel,
            })
        }
        None => Ok(StagedFile {
            filename,
            producer: None,
            channel: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_paths_are_keyed_by_signature() {
        let sandbox = Sandbox::for_signature(Path::new("/tmp/build"), "abc");
        assert_eq!(sandbox.dir(), Path::new("/tmp/build/abc"));
        assert!(sandbox.script_path().ends_with(SCRIPT_FILENAME));
        assert!(sandbox.report_path().ends_with(REPORT_FILENAME));
        assert!(sandbox.success_path().ends_with(SUCCESS_FILENAME));
    }
}
