// ABOUTME: Fixed-point combinatorial enumeration of task-node invocations
// ABOUTME: Sizes become derivable incrementally; underivable nodes are retried

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use tracing::debug;

use super::combi::CombiTable;
use super::error::{DagError, NotDerivable};
use super::graph::WorkflowGraph;
use super::invocation::Invocation;
use super::value::DataList;
use super::{Element, NodeId};
use crate::lang::TASK_PARAM;

/// Runs enumeration passes until a full pass materializes no new invocation.
/// Returns how many invocations were created. A node whose sizes are not yet
/// derivable is skipped, not failed; it is retried on the next call once more
/// outputs have been bound.
pub fn enumerate(graph: &mut WorkflowGraph) -> Result<usize, DagError> {
    let mut total = 0;

    loop {
        let mut fresh = 0;

        for task in graph.relevant_task_nodes() {
            if graph.has_invocations(task) {
                continue;
            }

            if let Some(invocations) = try_enumerate_node(graph, task)? {
                debug!(
                    task = %task,
                    count = invocations.len(),
                    "materialized invocations"
                );
                fresh += invocations.len();
                for invocation in invocations {
                    graph.add_invocation(invocation);
                }
            }
        }

        if fresh == 0 {
            return Ok(total);
        }
        total += fresh;
    }
}

/// Attempts to materialize the invocation set of one task node.
///
/// `Ok(None)` means "not derivable yet, retry later"; `Err` is a hard
/// contradiction in the workflow itself.
fn try_enumerate_node(
    graph: &WorkflowGraph,
    task: NodeId,
) -> Result<Option<Vec<Invocation>>, DagError> {
    let params = graph.param_map(task);

    // A task node without a task binding was already diagnosed at build time;
    // it can simply never enumerate.
    let Some(&task_parent) = params.get(TASK_PARAM) else {
        return Ok(None);
    };
    let task_list = graph.data_list(task_parent, 0);

    let repr_name = match task_list.realization() {
        Ok(name) => name.to_string(),
        Err(NotDerivable) => return Ok(None),
    };
    let repr = graph.prototype_by_name(&repr_name)?;

    // Every declared parameter must have a matching bound parent.
    let declared: HashSet<String> = repr.param_names().into_iter().collect();
    let bound: HashSet<String> = params.keys().cloned().collect();
    if declared != bound {
        let mut declared: Vec<String> = declared.into_iter().collect();
        let mut bound: Vec<String> = bound.into_iter().collect();
        declared.sort();
        bound.sort();
        return Err(DagError::ParamMismatch {
            task: format!("{task}"),
            proto: repr_name,
            bound,
            declared,
        });
    }

    let mut combi = CombiTable::new();
    let groups = repr.all_param_groups();
    for group in &groups {
        combi.register(group);
    }

    let lists: Vec<(String, DataList)> = params
        .iter()
        .map(|(name, &parent)| (name.clone(), graph.data_list(parent, 0)))
        .collect();

    for (name, list) in &lists {
        match list.len(graph) {
            Ok(n) => combi.set_size(name, n)?,
            Err(NotDerivable) => return Ok(None),
        }
    }

    if !combi.all_sizes_known() {
        return Err(DagError::Inconsistent(format!(
            "task node {task}: a parameter group never received a size"
        )));
    }
    let total = combi.combination_count().map_err(|_| {
        DagError::Inconsistent(format!("task node {task}: combination count underivable"))
    })?;

    let mut out = Vec::with_capacity(total);

    for i in 0..total {
        // The chosen prototype may vary per combination when the task
        // parameter is bound to a computed list.
        let task_idx = combi.task_sub_index(i)?;
        let chosen = match task_list.get(graph, task_idx).and_then(|r| r.value(graph)) {
            Ok(value) => value,
            Err(NotDerivable) => return Ok(None),
        };
        let chosen_proto = graph.prototype_by_name(&chosen)?;
        let language = chosen_proto
            .language()
            .map_err(|message| DagError::Language {
                task: chosen.clone(),
                message,
            })?;

        let mut invocation = Invocation::new(task, chosen.clone(), repr, language);

        for (name, list) in &lists {
            if name == TASK_PARAM {
                continue;
            }

            if repr.is_param_reduce(name) {
                invocation.bind_reduce(name.clone(), list.clone());
            } else {
                let idx = combi.sub_index(name, i)?;
                match list.get(graph, idx) {
                    Ok(resolved) => invocation.bind_single(name.clone(), resolved),
                    Err(NotDerivable) => return Ok(None),
                }
            }
        }

        out.push(invocation);
    }

    Ok(Some(out))
}

/// Verifies that every relevant task node enumerated and every invocation
/// computed. When something is left behind, distinguishes a dependency cycle
/// from an underivable-size stall instead of going quiet.
pub fn check_complete(graph: &WorkflowGraph) -> Result<(), DagError> {
    let mut unresolved = Vec::new();

    for task in graph.relevant_task_nodes() {
        if !graph.has_invocations(task) {
            unresolved.push(describe(graph, task));
            continue;
        }
        for &id in graph.invocations_of(task) {
            if !graph.invocation(id).is_computed() {
                unresolved.push(format!(
                    "invocation {id} of {}",
                    describe(graph, task)
                ));
            }
        }
    }

    if unresolved.is_empty() {
        return Ok(());
    }

    let mut pg: DiGraph<NodeId, ()> = DiGraph::new();
    let indices: Vec<_> = graph.node_ids().map(|n| pg.add_node(n)).collect();
    for edge in graph.edges() {
        pg.add_edge(
            indices[edge.parent.index()],
            indices[edge.child.index()],
            (),
        );
    }

    match toposort(&pg, None) {
        Ok(_) => Err(DagError::Stalled(unresolved)),
        Err(cycle) => {
            let node = pg[cycle.node_id()];
            Err(DagError::DependencyCycle(vec![describe(graph, node)]))
        }
    }
}

fn describe(graph: &WorkflowGraph, node: NodeId) -> String {
    match graph.element(node) {
        Element::Junction { name } => format!("variable '{name}'"),
        Element::Task => match graph.chosen_task_name(node) {
            Ok(name) => format!("task '{name}' ({node})"),
            Err(_) => format!("task node {node}"),
        },
        other => format!("{} {node}", other.kind()),
    }
}
