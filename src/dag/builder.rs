// ABOUTME: Assembles the workflow element graph from parsed units
// ABOUTME: Macros are erased here; problems accumulate as diagnostics

use tracing::debug;
use uuid::Uuid;

use super::diagnostics::{BuildReport, DiagnosticKind};
use super::error::DagError;
use super::graph::{Link, WorkflowGraph};
use super::NodeId;
use crate::lang::{
    expand_expressions, Assign, Expression, GroupMode, TaskPrototype, WorkflowUnit, TASK_PARAM,
};

/// Builds one element graph out of one or more workflow units. The terminal
/// set is the union of every unit's target set.
pub struct GraphBuilder {
    graph: WorkflowGraph,
    report: BuildReport,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4().to_string())
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            graph: WorkflowGraph::new(run_id),
            report: BuildReport::default(),
        }
    }

    pub fn finish(self) -> (WorkflowGraph, BuildReport) {
        (self.graph, self.report)
    }

    /// Compiles `unit` into the graph. User-input problems become
    /// diagnostics; an `Err` here means the builder itself produced an
    /// inconsistent structure.
    pub fn add_unit(&mut self, unit: &WorkflowUnit) -> Result<(), DagError> {
        let wf = unit.workflow.as_str();
        self.graph.register_workflow_name(wf);

        for (name, proto) in &unit.tasks {
            if self.validate_prototype(wf, name, proto) {
                self.graph.add_prototype(name.clone(), proto.clone());
            }
        }

        for assign in &unit.assigns {
            self.resolve_assign(unit, assign)?;
        }

        for target in &unit.targets {
            match self.graph.junction_by_name(target) {
                Some(junction) => self.graph.add_terminal(junction)?,
                None => self.report.error(
                    DiagnosticKind::UnknownTarget,
                    format!("{wf}.targets"),
                    format!("target variable '{target}' is never assigned"),
                ),
            }
        }

        debug!(workflow = wf, "unit compiled into element graph");
        Ok(())
    }

    /// Prototype-level checks; returns whether the prototype is usable.
    fn validate_prototype(&mut self, wf: &str, name: &str, proto: &TaskPrototype) -> bool {
        let context = format!("{wf}.task {name}");
        let mut ok = true;

        if self.graph.prototype_node_by_name(name).is_some() {
            self.report.error(
                DiagnosticKind::DuplicateDefinition,
                &context,
                format!("task '{name}' is defined more than once"),
            );
            return false;
        }

        if proto.outputs.is_empty() {
            self.report.error(
                DiagnosticKind::InvalidPrototype,
                &context,
                "a task must declare at least one output",
            );
            ok = false;
        }

        let mut seen_outputs = std::collections::HashSet::new();
        for output in &proto.outputs {
            if !seen_outputs.insert(output.name.as_str()) {
                self.report.error(
                    DiagnosticKind::DuplicateDefinition,
                    &context,
                    format!("output '{}' is declared more than once", output.name),
                );
                ok = false;
            }
        }

        let mut seen_params = std::collections::HashSet::new();
        for group in &proto.params {
            for member in &group.members {
                if !seen_params.insert(member.name.as_str()) {
                    self.report.error(
                        DiagnosticKind::DuplicateDefinition,
                        &context,
                        format!("parameter '{}' is declared more than once", member.name),
                    );
                    ok = false;
                }
                if member.name == TASK_PARAM && group.mode == GroupMode::Reduce {
                    self.report.error(
                        DiagnosticKind::InvalidPrototype,
                        &context,
                        "the task selection parameter cannot be marked reduce",
                    );
                    ok = false;
                }
            }
        }

        if let Err(message) = proto.language() {
            self.report
                .error(DiagnosticKind::InvalidPrototype, &context, message);
            ok = false;
        }

        ok
    }

    fn resolve_assign(&mut self, unit: &WorkflowUnit, assign: &Assign) -> Result<(), DagError> {
        let wf = unit.workflow.as_str();

        let Some(primary) = assign.vars.first() else {
            self.report.error(
                DiagnosticKind::MalformedArity,
                format!("{wf}.assign"),
                "an assignment needs at least one left-hand variable",
            );
            return Ok(());
        };
        let context = format!("{wf}.assign {primary}");

        if self.graph.junction_by_name(primary).is_some() {
            self.report.error(
                DiagnosticKind::DuplicateDefinition,
                &context,
                format!("variable '{primary}' is assigned more than once"),
            );
            return Ok(());
        }

        let exprs = match expand_expressions(&assign.exprs, &unit.macros) {
            Ok(exprs) => exprs,
            Err(err) => {
                self.report
                    .error(DiagnosticKind::MacroExpansion, &context, err.to_string());
                return Ok(());
            }
        };

        if exprs.is_empty() {
            self.report.error(
                DiagnosticKind::EmptyExpression,
                &context,
                "the right-hand expression list is empty",
            );
            return Ok(());
        }

        let junction = self.graph.add_junction(primary.clone());
        let roots = self.resolve_exprs(&context, &exprs, Some(junction))?;

        for &root in &roots {
            self.graph.connect(root, junction, Link::Flow { channel: 0 })?;
        }

        // Secondary variables bind the extra output channels of task-node roots.
        let task_roots: Vec<NodeId> = roots
            .iter()
            .copied()
            .filter(|&n| self.graph.element(n).is_task())
            .collect();

        for (channel, var) in assign.vars.iter().enumerate().skip(1) {
            if self.graph.junction_by_name(var).is_some() {
                self.report.error(
                    DiagnosticKind::DuplicateDefinition,
                    &context,
                    format!("variable '{var}' is assigned more than once"),
                );
                continue;
            }
            if task_roots.is_empty() {
                self.report.error(
                    DiagnosticKind::MalformedArity,
                    &context,
                    format!("variable '{var}' needs a task application to bind output channel {channel}"),
                );
                continue;
            }

            let secondary = self.graph.add_junction(var.clone());
            for &task in &task_roots {
                self.graph.connect(task, secondary, Link::Flow { channel })?;
            }
        }

        Ok(())
    }

    /// Resolves an expression list (already macro-free) to graph roots.
    fn resolve_exprs(
        &mut self,
        context: &str,
        exprs: &[Expression],
        defining: Option<NodeId>,
    ) -> Result<Vec<NodeId>, DagError> {
        let mut roots = Vec::new();

        for expr in exprs {
            match expr {
                Expression::Str(lit) => {
                    roots.push(self.graph.add_data(lit.value.clone(), lit.stage));
                }

                Expression::Id(name) => match self.graph.junction_or_prototype(name) {
                    Some(node) if Some(node) == defining => {
                        self.report.error(
                            DiagnosticKind::SelfReference,
                            context,
                            format!("assignment refers to its own variable '{name}'"),
                        );
                    }
                    Some(node) => roots.push(node),
                    None => {
                        self.report.error(
                            DiagnosticKind::UnresolvedReference,
                            context,
                            format!("'{name}' names neither a variable nor a task"),
                        );
                    }
                },

                Expression::Apply(apply) => {
                    let task = self.graph.add_task();

                    if !apply.params.contains_key(TASK_PARAM) {
                        self.report.error(
                            DiagnosticKind::MalformedArity,
                            context,
                            "apply expression lacks the mandatory 'task' parameter",
                        );
                    }

                    for (param, list) in &apply.params {
                        let parents = self.resolve_exprs(context, list, defining)?;

                        match parents.len() {
                            0 => {
                                self.report.error(
                                    DiagnosticKind::EmptyExpression,
                                    context,
                                    format!("parameter '{param}' binds to no values"),
                                );
                            }
                            1 => {
                                self.graph.connect(
                                    parents[0],
                                    task,
                                    Link::Param {
                                        name: param.clone(),
                                    },
                                )?;
                            }
                            _ => {
                                let union = self.graph.add_union();
                                for parent in parents {
                                    self.graph.connect(
                                        parent,
                                        union,
                                        Link::Flow { channel: 0 },
                                    )?;
                                }
                                self.graph.connect(
                                    union,
                                    task,
                                    Link::Param {
                                        name: param.clone(),
                                    },
                                )?;
                            }
                        }
                    }

                    roots.push(task);
                }

                Expression::Macro(call) => {
                    // Expansion runs before resolution, so this is unreachable
                    // for well-formed input.
                    self.report.error(
                        DiagnosticKind::MacroExpansion,
                        context,
                        format!("macro '{}' survived expansion", call.name),
                    );
                }
            }
        }

        Ok(roots)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{ApplyExpression, OutputDecl};
    use indexmap::IndexMap;

    fn echo_unit() -> WorkflowUnit {
        WorkflowUnit {
            workflow: "wf".to_string(),
            tasks: IndexMap::from([(
                "t".to_string(),
                TaskPrototype {
                    labels: vec![],
                    params: vec![],
                    outputs: vec![OutputDecl {
                        name: "x".to_string(),
                        stage: true,
                        reduce: false,
                    }],
                    body: "echo hi > $x".to_string(),
                },
            )]),
            macros: IndexMap::new(),
            assigns: vec![Assign {
                vars: vec!["x".to_string()],
                exprs: vec![Expression::Apply(ApplyExpression {
                    params: IndexMap::from([("task".to_string(), vec![Expression::id("t")])]),
                })],
            }],
            targets: vec!["x".to_string()],
        }
    }

    fn build(unit: &WorkflowUnit) -> (WorkflowGraph, BuildReport) {
        let mut builder = GraphBuilder::with_run_id("test-run");
        builder.add_unit(unit).unwrap();
        builder.finish()
    }

    #[test]
    fn test_minimal_apply_assignment_wires_terminal() {
        let (graph, report) = build(&echo_unit());
        assert!(!report.has_errors(), "{:?}", report.diagnostics());

        assert_eq!(graph.terminals().len(), 1);
        let tasks = graph.relevant_task_nodes();
        assert_eq!(tasks.len(), 1);
        assert_eq!(graph.chosen_task_name(tasks[0]).unwrap(), "t");
    }

    #[test]
    fn test_multi_valued_param_gets_union() {
        let mut unit = echo_unit();
        unit.assigns[0].exprs = vec![Expression::Apply(ApplyExpression {
            params: IndexMap::from([
                ("task".to_string(), vec![Expression::id("t")]),
                (
                    "input".to_string(),
                    vec![Expression::literal("a"), Expression::literal("b")],
                ),
            ]),
        })];

        let (graph, report) = build(&unit);
        assert!(!report.has_errors());

        let task = graph.relevant_task_nodes()[0];
        let params = graph.param_map(task);
        let union = params["input"];
        assert!(matches!(graph.element(union), super::super::Element::Union));
        assert_eq!(graph.flow_parents(union).len(), 2);

        let list = graph.data_list(union, 0);
        assert_eq!(list.values(&graph).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_secondary_vars_bind_extra_channels() {
        let mut unit = echo_unit();
        unit.tasks.get_mut("t").unwrap().outputs.push(OutputDecl {
            name: "y".to_string(),
            stage: false,
            reduce: false,
        });
        unit.assigns[0].vars = vec!["x".to_string(), "y".to_string()];
        unit.targets = vec!["x".to_string(), "y".to_string()];

        let (graph, report) = build(&unit);
        assert!(!report.has_errors());
        assert_eq!(graph.terminals().len(), 2);

        let y = graph.junction_by_name("y").unwrap();
        assert_eq!(graph.flow_parents(y)[0].1, 1);
    }

    #[test]
    fn test_unresolved_and_self_references_are_diagnosed() {
        let mut unit = echo_unit();
        unit.assigns.push(Assign {
            vars: vec!["a".to_string()],
            exprs: vec![Expression::id("missing")],
        });
        unit.assigns.push(Assign {
            vars: vec!["b".to_string()],
            exprs: vec![Expression::id("b")],
        });

        let (_, report) = build(&unit);
        assert!(report.has_errors());

        let kinds: Vec<_> = report.errors().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::UnresolvedReference));
        assert!(kinds.contains(&DiagnosticKind::SelfReference));
    }

    #[test]
    fn test_duplicate_assignment_is_diagnosed() {
        let mut unit = echo_unit();
        unit.assigns.push(Assign {
            vars: vec!["x".to_string()],
            exprs: vec![Expression::literal("again")],
        });

        let (_, report) = build(&unit);
        assert!(report
            .errors()
            .any(|d| d.kind == DiagnosticKind::DuplicateDefinition));
    }

    #[test]
    fn test_missing_task_param_is_diagnosed_but_build_continues() {
        let mut unit = echo_unit();
        unit.assigns[0].exprs = vec![Expression::Apply(ApplyExpression {
            params: IndexMap::new(),
        })];

        let (graph, report) = build(&unit);
        assert!(report
            .errors()
            .any(|d| d.kind == DiagnosticKind::MalformedArity));
        // The graph still exists; it just cannot be dispatched.
        assert_eq!(graph.relevant_task_nodes().len(), 1);
    }

    #[test]
    fn test_macro_is_erased_before_resolution() {
        let mut unit = echo_unit();
        unit.macros.insert(
            "wrap".to_string(),
            crate::lang::MacroDef {
                params: vec!["v".to_string()],
                exprs: vec![Expression::id("v")],
            },
        );
        unit.assigns.push(Assign {
            vars: vec!["w".to_string()],
            exprs: vec![Expression::Macro(crate::lang::MacroCall {
                name: "wrap".to_string(),
                args: IndexMap::from([("v".to_string(), vec![Expression::literal("lit")])]),
            })],
        });

        let (graph, report) = build(&unit);
        assert!(!report.has_errors());

        let w = graph.junction_by_name("w").unwrap();
        assert_eq!(graph.data_list(w, 0).values(&graph).unwrap(), vec!["lit"]);
    }
}
