// ABOUTME: Fatal dispatch errors; an execution failure carries the full
// ABOUTME: line-numbered script and both captured streams

use std::fmt;
use thiserror::Error;

use crate::dag::DagError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("staged file '{filename}' is missing from producer sandbox {producer}")]
    StagingMissing { filename: String, producer: String },

    #[error("{0}")]
    InvocationFailed(Box<FailureReport>),

    #[error("report line is not valid JSON: {0}")]
    ReportParse(#[from] serde_json::Error),

    #[error("invocation output payload for '{task}' lacks declared output '{output}'")]
    ReportMissingOutput { task: String, output: String },

    #[error("invocation output payload for '{task}' output '{output}' is not an array of strings")]
    ReportMalformedOutput { task: String, output: String },

    #[error("stream reader tasks did not finish within {0} seconds")]
    StreamDrain(u64),

    #[error("task failed to join: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("inconsistent engine state: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Diagnostic bundle for a failed subprocess: the generated script with line
/// numbers plus everything it printed.
#[derive(Debug)]
pub struct FailureReport {
    pub task_name: String,
    pub signature: String,
    pub exit_code: Option<i32>,
    pub script: String,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => writeln!(
                f,
                "invocation of task '{}' with signature {} terminated with exit value {code}",
                self.task_name, self.signature
            )?,
            None => writeln!(
                f,
                "invocation of task '{}' with signature {} was terminated by a signal",
                self.task_name, self.signature
            )?,
        }

        writeln!(f, "[script]")?;
        for (i, line) in self.script.lines().enumerate() {
            writeln!(f, "{:02}  {line}", i + 1)?;
        }
        writeln!(f, "[out]")?;
        writeln!(f, "{}", self.stdout.trim_end())?;
        writeln!(f, "[err]")?;
        writeln!(f, "{}", self.stderr.trim_end())?;
        write!(f, "[end]")
    }
}
