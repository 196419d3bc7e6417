// ABOUTME: One concrete, fully-bound call of a task: bindings, output slots,
// ABOUTME: the derived state machine, and the content-derived cache signature

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use super::error::{DagError, Derivable, NotDerivable};
use super::graph::WorkflowGraph;
use super::value::{DataList, Resolved};
use super::NodeId;
use crate::lang::{Language, TaskPrototype, TASK_PARAM};

/// Arena index of an invocation within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub(crate) usize);

impl InvocationId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Lifecycle of an invocation, derived from its bindings and advancing in one
/// direction only. There is no failed state: execution failure aborts the
/// whole dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Created, but not every bound value is derivable yet.
    Enumerable,
    /// The signature can be computed and no output is bound.
    Ready,
    /// Every output channel carries a bound value list.
    Success,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub(crate) id: InvocationId,
    task_node: NodeId,
    task_name: String,
    language: Language,
    single_params: IndexMap<String, Resolved>,
    reduce_params: IndexMap<String, DataList>,
    outputs: Vec<OutputSlot>,
}

/// Per-output-channel binding: a declared or derived size, and the value
/// list once the producing subprocess has reported.
#[derive(Debug, Clone, Default)]
pub struct OutputSlot {
    size: Option<usize>,
    values: Option<Vec<String>>,
}

impl Invocation {
    /// Creates an invocation for `task_name` at `task_node`. Output slots
    /// follow `proto` (the task node's representative prototype); non-reduce
    /// output sizes default to 1: their cardinality is structurally known
    /// without executing anything, which is what lets downstream sizes derive
    /// before this invocation runs.
    pub fn new(
        task_node: NodeId,
        task_name: impl Into<String>,
        proto: &TaskPrototype,
        language: Language,
    ) -> Self {
        let task_name = task_name.into();

        let outputs = proto
            .outputs
            .iter()
            .map(|o| OutputSlot {
                size: if o.reduce { None } else { Some(1) },
                values: None,
            })
            .collect();

        let mut single_params = IndexMap::new();
        single_params.insert(TASK_PARAM.to_string(), Resolved::Item(task_name.clone()));

        Self {
            id: InvocationId(usize::MAX),
            task_node,
            task_name,
            language,
            single_params,
            reduce_params: IndexMap::new(),
            outputs,
        }
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn task_node(&self) -> NodeId {
        self.task_node
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn bind_single(&mut self, name: impl Into<String>, value: Resolved) {
        self.single_params.insert(name.into(), value);
    }

    pub fn bind_reduce(&mut self, name: impl Into<String>, list: DataList) {
        self.reduce_params.insert(name.into(), list);
    }

    pub fn single_params(&self) -> &IndexMap<String, Resolved> {
        &self.single_params
    }

    pub fn reduce_params(&self) -> &IndexMap<String, DataList> {
        &self.reduce_params
    }

    pub fn n_output_channels(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_size(&self, channel: usize) -> Derivable<usize> {
        self.outputs[channel].size.ok_or(NotDerivable)
    }

    pub fn output_values(&self, channel: usize) -> Derivable<&[String]> {
        self.outputs[channel]
            .values
            .as_deref()
            .ok_or(NotDerivable)
    }

    /// Binds one output channel from a report payload. Sets the channel size
    /// from the bound list; a single (non-reduce) output must bind exactly
    /// one value, since enumeration already promised that size downstream.
    pub fn bind_output(
        &mut self,
        proto: &TaskPrototype,
        output_name: &str,
        values: Vec<String>,
    ) -> Result<(), DagError> {
        let channel = proto
            .output_index_of(output_name)
            .ok_or_else(|| DagError::UnknownOutput {
                task: self.task_name.clone(),
                output: output_name.to_string(),
            })?;

        if !proto.outputs[channel].reduce && values.len() != 1 {
            return Err(DagError::OutputArity {
                task: self.task_name.clone(),
                output: output_name.to_string(),
                n: values.len(),
            });
        }

        self.outputs[channel].size = Some(values.len());
        self.outputs[channel].values = Some(values);
        Ok(())
    }

    /// True once every output channel has a bound value list.
    pub fn is_computed(&self) -> bool {
        self.outputs.iter().all(|o| o.values.is_some())
    }

    /// True iff not computed and the signature is derivable.
    pub fn is_ready(&self, graph: &WorkflowGraph) -> bool {
        !self.is_computed() && self.signature(graph).is_ok()
    }

    pub fn state(&self, graph: &WorkflowGraph) -> InvocationState {
        if self.is_computed() {
            InvocationState::Success
        } else if self.signature(graph).is_ok() {
            InvocationState::Ready
        } else {
            InvocationState::Enumerable
        }
    }

    /// The content-derived identity of this invocation: a SHA-256 digest over
    /// a canonical serialization of task name, body, declared outputs, and
    /// every bound parameter value. Independent of map iteration order and
    /// stable across process restarts; it doubles as the cache key.
    pub fn signature(&self, graph: &WorkflowGraph) -> Derivable<String> {
        let proto = graph
            .prototype_by_name(&self.task_name)
            .map_err(|_| NotDerivable)?;

        let mut hasher = Sha256::new();
        frame(&mut hasher, &[b"task", self.task_name.as_bytes()]);
        frame(&mut hasher, &[b"body", proto.body.as_bytes()]);

        for output in &proto.outputs {
            frame(
                &mut hasher,
                &[
                    b"output",
                    output.name.as_bytes(),
                    &[output.stage as u8, output.reduce as u8],
                ],
            );
        }

        let mut single_names: Vec<&String> = self.single_params.keys().collect();
        single_names.sort();
        for name in single_names {
            let value = self.single_params[name].value(graph)?;
            frame(&mut hasher, &[b"param", name.as_bytes(), value.as_bytes()]);
        }

        let mut reduce_names: Vec<&String> = self.reduce_params.keys().collect();
        reduce_names.sort();
        for name in reduce_names {
            let values = self.reduce_params[name].values(graph)?;
            for (i, value) in values.iter().enumerate() {
                frame(
                    &mut hasher,
                    &[
                        b"reduce",
                        name.as_bytes(),
                        &(i as u64).to_be_bytes(),
                        value.as_bytes(),
                    ],
                );
            }
        }

        let digest = hasher.finalize();
        Ok(hex_encode(&digest))
    }

    /// The resolved value of a single parameter.
    pub fn single_value(&self, graph: &WorkflowGraph, name: &str) -> Derivable<String> {
        self.single_params
            .get(name)
            .ok_or(NotDerivable)?
            .value(graph)
    }

    /// The resolved values of a reduce parameter.
    pub fn reduce_values(&self, graph: &WorkflowGraph, name: &str) -> Derivable<Vec<String>> {
        self.reduce_params
            .get(name)
            .ok_or(NotDerivable)?
            .values(graph)
    }
}

/// Hashes a length-framed record so that field boundaries are unambiguous.
fn frame(hasher: &mut Sha256, parts: &[&[u8]]) {
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.update([0xff]);
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::OutputDecl;

    fn proto() -> TaskPrototype {
        TaskPrototype {
            labels: vec![],
            params: vec![],
            outputs: vec![
                OutputDecl {
                    name: "out".to_string(),
                    stage: false,
                    reduce: false,
                },
                OutputDecl {
                    name: "parts".to_string(),
                    stage: true,
                    reduce: true,
                },
            ],
            body: "echo".to_string(),
        }
    }

    #[test]
    fn test_new_invocation_defaults_single_output_sizes() {
        let inv = Invocation::new(NodeId(0), "t", &proto(), Language::Bash);
        assert_eq!(inv.output_size(0).unwrap(), 1);
        assert_eq!(inv.output_size(1), Err(NotDerivable));
        assert!(!inv.is_computed());
    }

    #[test]
    fn test_bind_output_enforces_single_arity() {
        let p = proto();
        let mut inv = Invocation::new(NodeId(0), "t", &p, Language::Bash);

        let err = inv
            .bind_output(&p, "out", vec!["a".to_string(), "b".to_string()])
            .unwrap_err();
        assert!(matches!(err, DagError::OutputArity { n: 2, .. }));

        inv.bind_output(&p, "out", vec!["a".to_string()]).unwrap();
        inv.bind_output(&p, "parts", vec!["p0".to_string(), "p1".to_string()])
            .unwrap();
        assert!(inv.is_computed());
        assert_eq!(inv.output_size(1).unwrap(), 2);
        assert_eq!(inv.output_values(1).unwrap(), ["p0", "p1"]);
    }

    #[test]
    fn test_bind_output_rejects_undeclared_name() {
        let p = proto();
        let mut inv = Invocation::new(NodeId(0), "t", &p, Language::Bash);
        assert!(matches!(
            inv.bind_output(&p, "ghost", vec!["x".to_string()]),
            Err(DagError::UnknownOutput { .. })
        ));
    }
}
