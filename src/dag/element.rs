// ABOUTME: Workflow element variants: data nodes, junctions, unions, prototypes,
// ABOUTME: and task nodes, plus the structural rules each endpoint enforces

use std::fmt;

use crate::lang::TaskPrototype;

/// Arena index of a workflow element. Ids are scoped to one graph and
/// allocated at construction time; they exist for debugging identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A node of the workflow element graph.
#[derive(Debug, Clone)]
pub enum Element {
    /// A literal string; the stage flag marks a value denoting an on-disk file.
    Data { literal: String, stage: bool },
    /// A named binding point, one per assignment target variable.
    Junction { name: String },
    /// An unnamed union point feeding exactly one task node.
    Union,
    /// An immutable task prototype.
    Prototype { name: String, proto: TaskPrototype },
    /// A call site; parameters and output consumers live on graph edges.
    Task,
}

impl Element {
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Data { .. } => "data",
            Element::Junction { .. } => "junction",
            Element::Union => "union",
            Element::Prototype { .. } => "prototype",
            Element::Task => "task",
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, Element::Task)
    }

    pub fn is_junction(&self) -> bool {
        matches!(self, Element::Junction { .. })
    }

    pub fn junction_name(&self) -> Option<&str> {
        match self {
            Element::Junction { name } => Some(name),
            _ => None,
        }
    }

    pub fn prototype(&self) -> Option<&TaskPrototype> {
        match self {
            Element::Prototype { proto, .. } => Some(proto),
            _ => None,
        }
    }

    /// Whether `child` may consume values from this element. Mirrors the
    /// ordering constraints of the element family: data and prototype nodes
    /// are pure sources, unions feed task nodes only, junctions do not chain
    /// into unions.
    pub fn accepts_child(&self, child: &Element) -> Result<(), String> {
        match (self, child) {
            (_, Element::Data { .. }) => Err("a data node cannot consume values".to_string()),
            (_, Element::Prototype { .. }) => {
                Err("a prototype node cannot consume values".to_string())
            }
            (Element::Union, Element::Task) => Ok(()),
            (Element::Union, other) => Err(format!(
                "a union's child must be a task node, not a {}",
                other.kind()
            )),
            _ => Ok(()),
        }
    }

    /// Whether `parent` may feed this element.
    pub fn accepts_parent(&self, parent: &Element) -> Result<(), String> {
        match (self, parent) {
            (Element::Union, Element::Union) => Err("unions do not chain".to_string()),
            (Element::Junction { .. }, Element::Union) => {
                Err("a union cannot feed a named junction".to_string())
            }
            (Element::Data { .. }, _) | (Element::Prototype { .. }, _) => {
                Err(format!("a {} node has no parents", self.kind()))
            }
            _ => Ok(()),
        }
    }
}
