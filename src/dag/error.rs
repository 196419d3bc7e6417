// ABOUTME: Error types for graph construction, enumeration, and value resolution
// ABOUTME: Separates the retry-later NotDerivable signal from fatal graph errors

use thiserror::Error;

/// Deferred-derivation signal: a size or value is not yet known because some
/// upstream invocation has not been enumerated or computed. Not a failure;
/// the enumerator treats it as "skip and retry on a later pass".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value or size not yet derivable")]
pub struct NotDerivable;

pub type Derivable<T> = std::result::Result<T, NotDerivable>;

/// Fatal graph-level errors. Unlike `NotDerivable` these are never retried:
/// they indicate contradictory workflow declarations or a broken internal
/// structure.
#[derive(Debug, Error)]
pub enum DagError {
    #[error("correlated parameter '{param}' has size {actual} but another group member has size {expected}")]
    SizeConflict {
        param: String,
        expected: usize,
        actual: usize,
    },

    #[error("no task prototype named '{0}' is registered")]
    UnknownTask(String),

    #[error("parameter '{0}' was never registered with the combination table")]
    UnknownParam(String),

    #[error("cannot enumerate reduce parameter '{0}'")]
    EnumerateReduce(String),

    #[error("task node {task} binds parameters {bound:?} but prototype '{proto}' declares {declared:?}")]
    ParamMismatch {
        task: String,
        proto: String,
        bound: Vec<String>,
        declared: Vec<String>,
    },

    #[error("task '{task}' has no output named '{output}'")]
    UnknownOutput { task: String, output: String },

    #[error("output '{output}' of task '{task}' is declared single but was bound to {n} values")]
    OutputArity {
        task: String,
        output: String,
        n: usize,
    },

    #[error("task '{task}': {message}")]
    Language { task: String, message: String },

    #[error("workflow contains a dependency cycle through {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("workflow stalled: no progress possible but {0:?} remain unresolved")]
    Stalled(Vec<String>),

    #[error("inconsistent workflow graph: {0}")]
    Inconsistent(String),
}
