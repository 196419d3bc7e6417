// ABOUTME: The resolvable value model: lazily-sized data lists over literals
// ABOUTME: and references into enumerated (but possibly uncomputed) invocations

use super::error::{Derivable, NotDerivable};
use super::graph::WorkflowGraph;
use super::invocation::InvocationId;
use super::NodeId;

/// One entry of a data list. A `TaskRef` stands for every value a task node's
/// output channel will eventually produce, across all of its invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Item(String),
    TaskRef { node: NodeId, channel: usize },
}

/// An ordered, heterogeneous sequence of literals and task references. Sizes
/// and element values resolve lazily against the graph; both fail with
/// [`NotDerivable`] while an upstream producer's cardinality is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataList {
    entries: Vec<Entry>,
}

/// The result of indexing a data list: either a plain literal or a pointer
/// into a specific invocation's output channel. The pointed-at value only
/// becomes readable once that invocation has computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Item(String),
    InvocRef {
        invocation: InvocationId,
        channel: usize,
        index: usize,
    },
}

impl DataList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_item(value: impl Into<String>) -> Self {
        Self {
            entries: vec![Entry::Item(value.into())],
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, other: DataList) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of values, flattening task references. Fails while any
    /// referenced task node has no enumerated invocations or an unbound
    /// reduce-output size.
    pub fn len(&self, graph: &WorkflowGraph) -> Derivable<usize> {
        let mut n = 0;
        for entry in &self.entries {
            n += match entry {
                Entry::Item(_) => 1,
                Entry::TaskRef { node, channel } => graph.task_ref_len(*node, *channel)?,
            };
        }
        Ok(n)
    }

    /// Indexes into the flattened list.
    ///
    /// Panics if `idx` is out of bounds once all sizes are derivable; callers
    /// obtain indices from the same size information, so an overrun is a
    /// programming error.
    pub fn get(&self, graph: &WorkflowGraph, idx: usize) -> Derivable<Resolved> {
        let mut i = idx;
        for entry in &self.entries {
            match entry {
                Entry::Item(value) => {
                    if i == 0 {
                        return Ok(Resolved::Item(value.clone()));
                    }
                    i -= 1;
                }
                Entry::TaskRef { node, channel } => {
                    let n = graph.task_ref_len(*node, *channel)?;
                    if i < n {
                        return graph.task_ref_get(*node, *channel, i);
                    }
                    i -= n;
                }
            }
        }
        panic!("index {idx} exceeds size of data list");
    }

    /// The first literal entry; the representative used to pick a task
    /// prototype before the full list is derivable.
    pub fn realization(&self) -> Derivable<&str> {
        for entry in &self.entries {
            if let Entry::Item(value) = entry {
                return Ok(value.as_str());
            }
        }
        Err(NotDerivable)
    }

    /// Resolves every element to its string value.
    pub fn values(&self, graph: &WorkflowGraph) -> Derivable<Vec<String>> {
        let n = self.len(graph)?;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(self.get(graph, i)?.value(graph)?);
        }
        Ok(out)
    }
}

impl Resolved {
    pub fn value(&self, graph: &WorkflowGraph) -> Derivable<String> {
        match self {
            Resolved::Item(value) => Ok(value.clone()),
            Resolved::InvocRef {
                invocation,
                channel,
                index,
            } => {
                let values = graph.invocation(*invocation).output_values(*channel)?;
                Ok(values[*index].clone())
            }
        }
    }

    /// The invocation that produces this value, if any.
    pub fn producer(&self) -> Option<(InvocationId, usize)> {
        match self {
            Resolved::Item(_) => None,
            Resolved::InvocRef {
                invocation,
                channel,
                ..
            } => Some((*invocation, *channel)),
        }
    }
}

impl FromIterator<Entry> for DataList {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realization_prefers_first_literal() {
        let mut list = DataList::new();
        list.push(Entry::TaskRef {
            node: NodeId(0),
            channel: 0,
        });
        list.push(Entry::Item("t".to_string()));
        assert_eq!(list.realization().unwrap(), "t");

        let empty = DataList::new();
        assert_eq!(empty.realization(), Err(NotDerivable));
    }

    #[test]
    fn test_item_only_list_sizes_without_graph_state() {
        let graph = WorkflowGraph::new("run");
        let mut list = DataList::new();
        list.push(Entry::Item("a".to_string()));
        list.push(Entry::Item("b".to_string()));

        assert_eq!(list.len(&graph).unwrap(), 2);
        assert_eq!(
            list.get(&graph, 1).unwrap(),
            Resolved::Item("b".to_string())
        );
        assert_eq!(list.values(&graph).unwrap(), vec!["a", "b"]);
    }
}
