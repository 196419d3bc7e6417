// ABOUTME: Arena-owned workflow element graph with a single edge list;
// ABOUTME: parent/child/parameter views and data lists are derived queries

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use indexmap::IndexMap;

use super::element::{Element, NodeId};
use super::error::{DagError, Derivable, NotDerivable};
use super::invocation::{Invocation, InvocationId};
use super::value::{DataList, Entry, Resolved};
use crate::lang::{TaskPrototype, TASK_PARAM};

/// A directed dependency edge. Stored once, in the graph; both traversal
/// directions are derived from the same record, so they cannot diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
    pub link: Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Values from the parent's output `channel` flow into the child.
    Flow { channel: usize },
    /// The parent is bound to the child task node's parameter `name`.
    Param { name: String },
}

/// The workflow element graph. Owns every element, edge, and invocation for
/// the lifetime of a run; all of them are addressed by arena indices scoped
/// to this graph.
#[derive(Debug)]
pub struct WorkflowGraph {
    run_id: String,
    wf_names: Vec<String>,
    current_wf: String,
    elements: Vec<Element>,
    element_wf: Vec<String>,
    edges: Vec<Edge>,
    invocations: Vec<Invocation>,
    task_invocations: HashMap<NodeId, Vec<InvocationId>>,
    terminals: Vec<NodeId>,
    junction_index: HashMap<String, NodeId>,
    prototype_index: HashMap<String, NodeId>,
}

impl WorkflowGraph {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            wf_names: Vec::new(),
            current_wf: String::new(),
            elements: Vec::new(),
            element_wf: Vec::new(),
            edges: Vec::new(),
            invocations: Vec::new(),
            task_invocations: HashMap::new(),
            terminals: Vec::new(),
            junction_index: HashMap::new(),
            prototype_index: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Registers the workflow a following batch of elements belongs to.
    /// Elements added afterwards carry this name as their owner.
    pub fn register_workflow_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.current_wf = name.clone();
        self.wf_names.push(name);
    }

    pub fn workflow_names(&self) -> &[String] {
        &self.wf_names
    }

    /// The workflow that declared `node`.
    pub fn workflow_of(&self, node: NodeId) -> &str {
        &self.element_wf[node.0]
    }

    // ---- element arena ----------------------------------------------------

    pub fn add_element(&mut self, element: Element) -> NodeId {
        let id = NodeId(self.elements.len());
        match &element {
            Element::Junction { name } => {
                self.junction_index.entry(name.clone()).or_insert(id);
            }
            Element::Prototype { name, .. } => {
                self.prototype_index.entry(name.clone()).or_insert(id);
            }
            _ => {}
        }
        self.elements.push(element);
        self.element_wf.push(self.current_wf.clone());
        id
    }

    pub fn add_data(&mut self, literal: impl Into<String>, stage: bool) -> NodeId {
        self.add_element(Element::Data {
            literal: literal.into(),
            stage,
        })
    }

    pub fn add_junction(&mut self, name: impl Into<String>) -> NodeId {
        self.add_element(Element::Junction { name: name.into() })
    }

    pub fn add_union(&mut self) -> NodeId {
        self.add_element(Element::Union)
    }

    pub fn add_prototype(&mut self, name: impl Into<String>, proto: TaskPrototype) -> NodeId {
        self.add_element(Element::Prototype {
            name: name.into(),
            proto,
        })
    }

    pub fn add_task(&mut self) -> NodeId {
        self.add_element(Element::Task)
    }

    pub fn element(&self, id: NodeId) -> &Element {
        &self.elements[id.0]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.elements.len()).map(NodeId)
    }

    // ---- edges ------------------------------------------------------------

    /// Connects `parent` to `child`. Enforces the element family's structural
    /// rules; a violation is a programming error in the caller, reported as
    /// an inconsistency.
    pub fn connect(&mut self, parent: NodeId, child: NodeId, link: Link) -> Result<(), DagError> {
        let p = &self.elements[parent.0];
        let c = &self.elements[child.0];

        p.accepts_child(c).map_err(DagError::Inconsistent)?;
        c.accepts_parent(p).map_err(DagError::Inconsistent)?;

        if matches!(link, Link::Param { .. }) && !c.is_task() {
            return Err(DagError::Inconsistent(format!(
                "parameter edges must point at task nodes, not a {}",
                c.kind()
            )));
        }

        let single_child = matches!(p, Element::Data { .. } | Element::Union);
        if single_child && self.edges.iter().any(|e| e.parent == parent) {
            return Err(DagError::Inconsistent(format!(
                "a {} node has exactly one child",
                p.kind()
            )));
        }

        self.edges.push(Edge {
            parent,
            child,
            link,
        });
        Ok(())
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Incoming flow edges of `child`, in insertion order, as
    /// `(parent, parent output channel)`.
    pub fn flow_parents(&self, child: NodeId) -> Vec<(NodeId, usize)> {
        self.edges
            .iter()
            .filter_map(|e| match (&e.link, e.child == child) {
                (Link::Flow { channel }, true) => Some((e.parent, *channel)),
                _ => None,
            })
            .collect()
    }

    /// Every parent of `child`, through flow and parameter edges alike.
    pub fn parents(&self, child: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.child == child)
            .map(|e| e.parent)
            .collect()
    }

    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.parent == parent)
            .map(|e| e.child)
            .collect()
    }

    /// Parameter bindings of a task node, in edge insertion order.
    pub fn param_map(&self, task: NodeId) -> IndexMap<String, NodeId> {
        let mut map = IndexMap::new();
        for edge in &self.edges {
            if edge.child == task {
                if let Link::Param { name } = &edge.link {
                    map.insert(name.clone(), edge.parent);
                }
            }
        }
        map
    }

    // ---- lookups ----------------------------------------------------------

    pub fn junction_by_name(&self, name: &str) -> Option<NodeId> {
        self.junction_index.get(name).copied()
    }

    pub fn prototype_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.prototype_index.get(name).copied()
    }

    pub fn prototype_by_name(&self, name: &str) -> Result<&TaskPrototype, DagError> {
        self.prototype_index
            .get(name)
            .and_then(|id| self.elements[id.0].prototype())
            .ok_or_else(|| DagError::UnknownTask(name.to_string()))
    }

    /// Resolves an identifier the way assignments do: junction first, then
    /// task prototype.
    pub fn junction_or_prototype(&self, name: &str) -> Option<NodeId> {
        self.junction_by_name(name)
            .or_else(|| self.prototype_node_by_name(name))
    }

    // ---- terminals --------------------------------------------------------

    pub fn add_terminal(&mut self, junction: NodeId) -> Result<(), DagError> {
        if !self.elements[junction.0].is_junction() {
            return Err(DagError::Inconsistent(
                "only named junctions can be terminal elements".to_string(),
            ));
        }
        if !self.terminals.contains(&junction) {
            self.terminals.push(junction);
        }
        Ok(())
    }

    pub fn terminals(&self) -> &[NodeId] {
        &self.terminals
    }

    /// Resolved values of every terminal junction, in declaration order.
    pub fn terminal_values(&self) -> Vec<(String, Derivable<Vec<String>>)> {
        self.terminals
            .iter()
            .map(|&t| {
                let name = self.elements[t.0]
                    .junction_name()
                    .unwrap_or_default()
                    .to_string();
                let values = self.data_list(t, 0).values(self);
                (name, values)
            })
            .collect()
    }

    // ---- data lists -------------------------------------------------------

    /// The data list an element offers on `channel`.
    ///
    /// Panics if a single-channel element is asked for a channel other than
    /// 0; that is a programming error, not workflow input.
    pub fn data_list(&self, node: NodeId, channel: usize) -> DataList {
        match &self.elements[node.0] {
            Element::Data { literal, .. } => {
                assert_eq!(channel, 0, "data node has only output channel 0");
                DataList::of_item(literal.clone())
            }
            Element::Prototype { name, .. } => {
                assert_eq!(channel, 0, "prototype node has only output channel 0");
                DataList::of_item(name.clone())
            }
            Element::Junction { .. } | Element::Union => {
                assert_eq!(channel, 0, "junctions have only output channel 0");
                let mut list = DataList::new();
                for (parent, parent_channel) in self.flow_parents(node) {
                    list.extend(self.data_list(parent, parent_channel));
                }
                list
            }
            Element::Task => {
                let mut list = DataList::new();
                list.push(Entry::TaskRef { node, channel });
                list
            }
        }
    }

    /// Whether values on `channel` of `node` denote files to be staged.
    pub fn stage(&self, node: NodeId, channel: usize) -> Derivable<bool> {
        match &self.elements[node.0] {
            Element::Data { stage, .. } => Ok(*stage),
            Element::Prototype { .. } => Ok(false),
            Element::Junction { .. } | Element::Union => {
                let (parent, parent_channel) =
                    *self.flow_parents(node).first().ok_or(NotDerivable)?;
                self.stage(parent, parent_channel)
            }
            Element::Task => {
                let proto = self.task_prototype(node)?;
                proto
                    .outputs
                    .get(channel)
                    .map(|o| o.stage)
                    .ok_or(NotDerivable)
            }
        }
    }

    /// The representative task name bound to a task node's `task` parameter:
    /// the first literal of the bound list. Underivable while the choice is
    /// still data-dependent on an uncomputed producer.
    pub fn chosen_task_name(&self, task: NodeId) -> Derivable<String> {
        let parent = self
            .param_map(task)
            .get(TASK_PARAM)
            .copied()
            .ok_or(NotDerivable)?;
        self.data_list(parent, 0).realization().map(str::to_string)
    }

    /// The representative prototype of a task node, used to classify its
    /// parameter groups before enumeration.
    pub fn task_prototype(&self, task: NodeId) -> Derivable<&TaskPrototype> {
        let name = self.chosen_task_name(task)?;
        self.prototype_by_name(&name).map_err(|_| NotDerivable)
    }

    // ---- invocations ------------------------------------------------------

    pub fn add_invocation(&mut self, mut invocation: Invocation) -> InvocationId {
        let id = InvocationId(self.invocations.len());
        invocation.id = id;
        let task = invocation.task_node();
        self.invocations.push(invocation);
        self.task_invocations.entry(task).or_default().push(id);
        id
    }

    pub fn invocation(&self, id: InvocationId) -> &Invocation {
        &self.invocations[id.0]
    }

    pub fn invocation_mut(&mut self, id: InvocationId) -> &mut Invocation {
        &mut self.invocations[id.0]
    }

    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.invocations.iter()
    }

    pub fn invocations_of(&self, task: NodeId) -> &[InvocationId] {
        self.task_invocations
            .get(&task)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_invocations(&self, task: NodeId) -> bool {
        !self.invocations_of(task).is_empty()
    }

    /// Binds one output channel of an invocation from a report payload,
    /// which is what unblocks downstream enumeration and readiness.
    pub fn bind_invocation_output(
        &mut self,
        id: InvocationId,
        output_name: &str,
        values: Vec<String>,
    ) -> Result<(), DagError> {
        let task_name = self.invocations[id.0].task_name().to_string();
        let proto = self.prototype_by_name(&task_name)?.clone();
        self.invocations[id.0].bind_output(&proto, output_name, values)
    }

    /// Flattened size of a task node's output channel across all of its
    /// invocations. Underivable until invocations exist and every one of
    /// them knows its size on that channel.
    pub fn task_ref_len(&self, task: NodeId, channel: usize) -> Derivable<usize> {
        let ids = self.invocations_of(task);
        if ids.is_empty() {
            return Err(NotDerivable);
        }

        let mut n = 0;
        for &id in ids {
            n += self.invocations[id.0].output_size(channel)?;
        }
        Ok(n)
    }

    /// Resolves index `idx` of a task node's output channel to the producing
    /// invocation and its local index.
    pub fn task_ref_get(&self, task: NodeId, channel: usize, idx: usize) -> Derivable<Resolved> {
        let mut i = idx;
        for &id in self.invocations_of(task) {
            let size = self.invocations[id.0].output_size(channel)?;
            if i < size {
                return Ok(Resolved::InvocRef {
                    invocation: id,
                    channel,
                    index: i,
                });
            }
            i -= size;
        }
        panic!("index {idx} exceeds size of task node output channel {channel}");
    }

    // ---- reachability -----------------------------------------------------

    /// Every element the terminal junctions transitively depend on,
    /// terminals included, ordered by id.
    pub fn relevant_elements(&self) -> Vec<NodeId> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = self.terminals.clone();

        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            stack.extend(self.parents(node));
        }

        let mut out: Vec<NodeId> = seen.into_iter().collect();
        out.sort();
        out
    }

    /// The task nodes involved in deriving any terminal value.
    pub fn relevant_task_nodes(&self) -> Vec<NodeId> {
        self.relevant_elements()
            .into_iter()
            .filter(|&n| self.elements[n.0].is_task())
            .collect()
    }

    /// Invocations of relevant task nodes whose signature is derivable but
    /// whose outputs are not yet bound.
    pub fn ready_invocations(&self) -> Vec<InvocationId> {
        let mut ready = Vec::new();
        for task in self.relevant_task_nodes() {
            for &id in self.invocations_of(task) {
                if self.invocations[id.0].is_ready(self) {
                    ready.push(id);
                }
            }
        }
        ready.sort();
        ready
    }

    // ---- rendering --------------------------------------------------------

    /// Graphviz rendering of the relevant element graph. Data nodes are
    /// omitted; the task-selection edge is dotted.
    pub fn to_dot(&self) -> String {
        let mut buf = String::from("digraph {\n");

        for node in self.relevant_elements() {
            let element = &self.elements[node.0];

            let line = match element {
                Element::Data { .. } => continue,
                Element::Junction { name } => {
                    format!("  {node} [label=\"{name}\",shape=plaintext];\n")
                }
                Element::Union => format!("  {node} [label=\"\",shape=point];\n"),
                Element::Prototype { name, .. } => {
                    format!("  {node} [label=\"{name}\",shape=plaintext];\n")
                }
                Element::Task => format!("  {node} [label=\"\",shape=box];\n"),
            };
            buf.push_str(&line);

            for edge in self.edges.iter().filter(|e| e.child == node) {
                if matches!(self.elements[edge.parent.0], Element::Data { .. }) {
                    continue;
                }
                let style = match &edge.link {
                    Link::Param { name } if name == TASK_PARAM => " [style=dotted]",
                    _ => "",
                };
                let _ = writeln!(buf, "  {} -> {}{};", edge.parent, node, style);
            }
        }

        buf.push_str("}\n");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{OutputDecl, TaskPrototype};

    fn echo_proto() -> TaskPrototype {
        TaskPrototype {
            labels: vec![],
            params: vec![],
            outputs: vec![OutputDecl {
                name: "out".to_string(),
                stage: false,
                reduce: false,
            }],
            body: "echo".to_string(),
        }
    }

    fn graph_with_task() -> (WorkflowGraph, NodeId, NodeId) {
        let mut g = WorkflowGraph::new("run");
        let proto = g.add_prototype("echo", echo_proto());
        let task = g.add_task();
        let junction = g.add_junction("x");

        g.connect(
            proto,
            task,
            Link::Param {
                name: TASK_PARAM.to_string(),
            },
        )
        .unwrap();
        g.connect(task, junction, Link::Flow { channel: 0 }).unwrap();
        g.add_terminal(junction).unwrap();

        (g, task, junction)
    }

    #[test]
    fn test_param_map_and_flow_parents_derive_from_one_edge_list() {
        let (g, task, junction) = graph_with_task();

        let params = g.param_map(task);
        assert_eq!(params.len(), 1);
        assert!(params.contains_key(TASK_PARAM));

        assert_eq!(g.flow_parents(junction), vec![(task, 0)]);
        assert_eq!(g.children(task), vec![junction]);
        assert_eq!(g.parents(junction), vec![task]);
    }

    #[test]
    fn test_chosen_task_name_resolves_through_prototype_literal() {
        let (g, task, _) = graph_with_task();
        assert_eq!(g.chosen_task_name(task).unwrap(), "echo");
        assert_eq!(g.task_prototype(task).unwrap().body, "echo");
    }

    #[test]
    fn test_task_ref_len_requires_invocations() {
        let (mut g, task, junction) = graph_with_task();

        let list = g.data_list(junction, 0);
        assert_eq!(list.len(&g), Err(NotDerivable));

        let proto = echo_proto();
        let inv = Invocation::new(task, "echo", &proto, crate::lang::Language::Bash);
        let id = g.add_invocation(inv);

        assert_eq!(list.len(&g).unwrap(), 1);

        g.bind_invocation_output(id, "out", vec!["hi".to_string()])
            .unwrap();
        assert_eq!(list.values(&g).unwrap(), vec!["hi"]);
    }

    #[test]
    fn test_relevant_set_excludes_unreachable_nodes() {
        let (mut g, task, _) = graph_with_task();

        // A second, dangling task node is not relevant.
        let stray = g.add_task();

        let relevant = g.relevant_task_nodes();
        assert!(relevant.contains(&task));
        assert!(!relevant.contains(&stray));
    }

    #[test]
    fn test_structural_rules_enforced_on_connect() {
        let mut g = WorkflowGraph::new("run");
        let d1 = g.add_data("a", false);
        let d2 = g.add_data("b", false);
        let union1 = g.add_union();
        let union2 = g.add_union();
        let junction = g.add_junction("x");

        // Data nodes never consume values.
        assert!(g.connect(d1, d2, Link::Flow { channel: 0 }).is_err());
        // Unions do not chain.
        assert!(g.connect(union1, union2, Link::Flow { channel: 0 }).is_err());
        // A union cannot feed a named junction.
        assert!(g
            .connect(union1, junction, Link::Flow { channel: 0 })
            .is_err());
        // A data node has exactly one child.
        let t1 = g.add_task();
        let t2 = g.add_task();
        g.connect(
            d1,
            t1,
            Link::Param {
                name: "a".to_string(),
            },
        )
        .unwrap();
        assert!(g
            .connect(
                d1,
                t2,
                Link::Param {
                    name: "a".to_string()
                }
            )
            .is_err());
    }

    #[test]
    fn test_elements_carry_their_owning_workflow() {
        let mut g = WorkflowGraph::new("run");
        g.register_workflow_name("alpha");
        let a = g.add_data("a", false);
        g.register_workflow_name("beta");
        let b = g.add_junction("x");

        assert_eq!(g.workflow_of(a), "alpha");
        assert_eq!(g.workflow_of(b), "beta");
        assert_eq!(g.workflow_names(), ["alpha", "beta"]);
    }

    #[test]
    fn test_stage_flag_propagates_through_junctions() {
        let mut g = WorkflowGraph::new("run");
        let data = g.add_data("ref.fa", true);
        let junction = g.add_junction("fa");
        g.connect(data, junction, Link::Flow { channel: 0 }).unwrap();

        assert!(g.stage(data, 0).unwrap());
        assert!(g.stage(junction, 0).unwrap());

        let empty = g.add_junction("empty");
        assert_eq!(g.stage(empty, 0), Err(NotDerivable));
    }

    #[test]
    fn test_dot_output_contains_relevant_nodes() {
        let (g, task, _) = graph_with_task();
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains(&format!("{task} [label=\"\",shape=box]")));
        assert!(dot.contains("style=dotted"));
    }
}
