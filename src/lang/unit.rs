// ABOUTME: The workflow unit, the external boundary towards the front-end parser
// ABOUTME: A unit carries prototypes, macros, assignments, and target variables

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::expression::Expression;
use super::task::TaskPrototype;

/// One parsed workflow source unit. Any front end that can produce this
/// structure (the reference front end emits it as YAML) can drive the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowUnit {
    /// Declared workflow name.
    pub workflow: String,

    /// Task name to prototype.
    #[serde(default)]
    pub tasks: IndexMap<String, TaskPrototype>,

    /// Macro name to definition; erased during graph construction.
    #[serde(default)]
    pub macros: IndexMap<String, MacroDef>,

    #[serde(default)]
    pub assigns: Vec<Assign>,

    /// Variables whose junctions become the workflow's terminal elements.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// An assignment `v1 .. vn = expr..`. The first variable binds the resolved
/// roots directly; the remaining variables bind the extra output channels of
/// task-node roots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assign {
    pub vars: Vec<String>,
    pub exprs: Vec<Expression>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroDef {
    #[serde(default)]
    pub params: Vec<String>,
    pub exprs: Vec<Expression>,
}

impl WorkflowUnit {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read workflow unit {}: {e}", path.display()))?;
        Ok(Self::from_yaml(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::task::GroupMode;

    #[test]
    fn test_unit_roundtrips_through_yaml() {
        let text = r#"
workflow: greet
tasks:
  say:
    labels: [bash]
    outputs:
      - name: x
        stage: true
    body: |
      echo hi > $x
assigns:
  - vars: [x]
    exprs:
      - !apply
        params:
          task: [!id say]
targets: [x]
"#;

        let unit = WorkflowUnit::from_yaml(text).unwrap();
        assert_eq!(unit.workflow, "greet");
        assert_eq!(unit.targets, vec!["x"]);
        assert!(unit.tasks["say"].outputs[0].stage);
        assert_eq!(unit.assigns.len(), 1);

        match &unit.assigns[0].exprs[0] {
            Expression::Apply(apply) => {
                assert_eq!(apply.params["task"], vec![Expression::id("say")]);
            }
            other => panic!("expected apply, got {other:?}"),
        }
    }

    #[test]
    fn test_param_groups_deserialize() {
        let text = r#"
workflow: wf
tasks:
  align:
    params:
      - members: [{name: idx, stage: true}]
      - mode: reduce
        members: [{name: fastq, stage: true}]
    outputs: [{name: sam, stage: true}]
    body: "true"
"#;

        let unit = WorkflowUnit::from_yaml(text).unwrap();
        let proto = &unit.tasks["align"];
        assert_eq!(proto.params[0].mode, GroupMode::Correlated);
        assert_eq!(proto.params[1].mode, GroupMode::Reduce);
        assert!(proto.is_param_reduce("fastq"));
        assert!(proto.is_param_stage("idx"));
    }
}
