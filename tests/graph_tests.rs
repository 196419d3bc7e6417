// ABOUTME: Integration tests for graph construction, enumeration fixed points,
// ABOUTME: and signature determinism across independently built graphs

mod common;

use stela::dag::{enumerate, DiagnosticKind, GraphBuilder, Resolved};

use common::{compile, unit_from_yaml, CHAIN_UNIT, GREET_UNIT};

#[test]
fn test_signature_is_stable_across_graphs_and_run_ids() {
    let mut a = compile(&[GREET_UNIT], "run-one");
    let mut b = compile(&[GREET_UNIT], "run-two");

    enumerate(&mut a).unwrap();
    enumerate(&mut b).unwrap();

    let sig_a = a.invocations().next().unwrap().signature(&a).unwrap();
    let sig_b = b.invocations().next().unwrap().signature(&b).unwrap();

    // The signature is a pure function of task name, body, outputs, and
    // bound values; the run id plays no part.
    assert_eq!(sig_a, sig_b);
}

#[test]
fn test_signature_ignores_parameter_iteration_order() {
    let forward = r#"
workflow: wf
tasks:
  t:
    params:
      - members: [{name: a}]
      - members: [{name: b}]
    outputs: [{name: o}]
    body: "true"
assigns:
  - vars: [o]
    exprs:
      - !apply
        params:
          task: [!id t]
          a: [!str {value: one}]
          b: [!str {value: two}]
targets: [o]
"#;
    // Identical workflow with the apply parameters written in reverse order.
    let reversed = r#"
workflow: wf
tasks:
  t:
    params:
      - members: [{name: a}]
      - members: [{name: b}]
    outputs: [{name: o}]
    body: "true"
assigns:
  - vars: [o]
    exprs:
      - !apply
        params:
          b: [!str {value: two}]
          a: [!str {value: one}]
          task: [!id t]
targets: [o]
"#;

    let mut f = compile(&[forward], "r");
    let mut r = compile(&[reversed], "r");
    enumerate(&mut f).unwrap();
    enumerate(&mut r).unwrap();

    assert_eq!(
        f.invocations().next().unwrap().signature(&f).unwrap(),
        r.invocations().next().unwrap().signature(&r).unwrap()
    );
}

#[test]
fn test_signature_changes_with_body_and_bindings() {
    let base = compile_single(GREET_UNIT);

    let other_body = GREET_UNIT.replace("echo hi", "echo ho");
    let changed_body = compile_single(&other_body);
    assert_ne!(base, changed_body);
}

fn compile_single(unit: &str) -> String {
    let mut g = compile(&[unit], "r");
    enumerate(&mut g).unwrap();
    let sig = g.invocations().next().unwrap().signature(&g).unwrap();
    sig
}

#[test]
fn test_signature_depends_on_bound_values() {
    let unit = unit_from_yaml(GREET_UNIT);
    let mut builder = GraphBuilder::with_run_id("r");
    builder.add_unit(&unit).unwrap();
    let (mut g, _) = builder.finish();
    enumerate(&mut g).unwrap();

    let id = g.invocations().next().unwrap().id();
    let reference = g.invocation(id).signature(&g).unwrap();

    // An extra binding changes the digest; the same binding twice does not.
    let mut extended = g.invocation(id).clone();
    extended.bind_single("zz", Resolved::Item("v".to_string()));
    let with_extra = extended.signature(&g).unwrap();
    assert_ne!(reference, with_extra);

    let mut extended_again = g.invocation(id).clone();
    extended_again.bind_single("zz", Resolved::Item("v".to_string()));
    assert_eq!(with_extra, extended_again.signature(&g).unwrap());
}

#[test]
fn test_multi_unit_compilation_unions_targets() {
    let mut g = compile(&[GREET_UNIT, CHAIN_UNIT], "multi");

    let names: Vec<String> = g
        .terminal_values()
        .iter()
        .map(|(n, _)| n.clone())
        .collect();
    assert_eq!(names, vec!["x", "fin"]);
    assert_eq!(g.workflow_names(), ["greet", "chain"]);

    // Everything enumerable up front: greet's task plus chain's producer and
    // consumer (size-1 defaults make the consumer enumerable immediately).
    assert_eq!(enumerate(&mut g).unwrap(), 3);
}

#[test]
fn test_fixed_point_terminates_on_deep_chain() {
    // a -> b -> c -> d, each stage consuming the previous one's output.
    let unit = r#"
workflow: deep
tasks:
  start:
    outputs: [{name: o}]
    body: "true"
  step:
    params:
      - members: [{name: input}]
    outputs: [{name: o}]
    body: "true"
assigns:
  - vars: [a]
    exprs:
      - !apply
        params:
          task: [!id start]
  - vars: [b]
    exprs:
      - !apply
        params:
          task: [!id step]
          input: [!id a]
  - vars: [c]
    exprs:
      - !apply
        params:
          task: [!id step]
          input: [!id b]
  - vars: [d]
    exprs:
      - !apply
        params:
          task: [!id step]
          input: [!id c]
targets: [d]
"#;

    let mut g = compile(&[unit], "deep");

    // All four nodes enumerate in one call thanks to default output sizes.
    assert_eq!(enumerate(&mut g).unwrap(), 4);
    assert_eq!(enumerate(&mut g).unwrap(), 0);

    // Only the first invocation is ready; the others wait on values.
    assert_eq!(g.ready_invocations().len(), 1);
}

#[test]
fn test_dot_rendering_covers_the_relevant_graph() {
    let g = compile(&[CHAIN_UNIT], "dot");
    let dot = g.to_dot();

    assert!(dot.starts_with("digraph {"));
    assert!(dot.ends_with("}\n"));
    assert!(dot.contains("label=\"mid\""));
    assert!(dot.contains("label=\"fin\""));
    assert!(dot.contains("style=dotted"));
}

#[test]
fn test_diagnostics_accumulate_without_aborting() {
    let unit = r#"
workflow: messy
tasks:
  t:
    outputs: [{name: o}]
    body: "true"
assigns:
  - vars: [a]
    exprs: [!id missing1]
  - vars: [b]
    exprs: [!id missing2]
targets: [a, b, ghost]
"#;

    let unit = unit_from_yaml(unit);
    let mut builder = GraphBuilder::with_run_id("r");
    builder.add_unit(&unit).unwrap();
    let (_, report) = builder.finish();

    assert!(report.has_errors());
    let kinds: Vec<DiagnosticKind> = report.errors().map(|d| d.kind).collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == DiagnosticKind::UnresolvedReference)
            .count(),
        2
    );
    assert!(kinds.contains(&DiagnosticKind::UnknownTarget));
}
