// ABOUTME: Shared helpers for integration tests
// ABOUTME: Compiles YAML workflow units into graphs with no diagnostics

use stela::dag::{GraphBuilder, WorkflowGraph};
use stela::lang::WorkflowUnit;

pub fn unit_from_yaml(text: &str) -> WorkflowUnit {
    WorkflowUnit::from_yaml(text).expect("workflow unit should parse")
}

pub fn compile(units: &[&str], run_id: &str) -> WorkflowGraph {
    let mut builder = GraphBuilder::with_run_id(run_id);
    for text in units {
        builder
            .add_unit(&unit_from_yaml(text))
            .expect("builder should stay consistent");
    }
    let (graph, report) = builder.finish();
    assert!(
        !report.has_errors(),
        "unexpected diagnostics: {:?}",
        report.diagnostics()
    );
    graph
}

/// The one-task scenario: a single apply of a task writing `hi` to a staged
/// output file.
pub const GREET_UNIT: &str = r#"
workflow: greet
tasks:
  t:
    outputs:
      - {name: x, stage: true}
    body: |
      echo hi > $x
assigns:
  - vars: [x]
    exprs:
      - !apply
        params:
          task: [!id t]
targets: [x]
"#;

/// Producer/consumer chain through staged files.
pub const CHAIN_UNIT: &str = r#"
workflow: chain
tasks:
  produce:
    outputs:
      - {name: out, stage: true}
    body: |
      echo payload > $out
  consume:
    params:
      - members: [{name: input, stage: true}]
    outputs:
      - {name: result, stage: true}
    body: |
      cat $input > $result
      echo done >> $result
assigns:
  - vars: [mid]
    exprs:
      - !apply
        params:
          task: [!id produce]
  - vars: [fin]
    exprs:
      - !apply
        params:
          task: [!id consume]
          input: [!id mid]
targets: [fin]
"#;
