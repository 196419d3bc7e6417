// ABOUTME: Workflow element graph module: values, elements, builder,
// ABOUTME: combinatorial enumeration, and invocation identity

pub mod builder;
pub mod combi;
pub mod diagnostics;
pub mod element;
pub mod enumerate;
pub mod error;
pub mod graph;
pub mod invocation;
pub mod value;

pub use builder::GraphBuilder;
pub use combi::CombiTable;
pub use diagnostics::{BuildDiagnostic, BuildReport, DiagnosticKind, Severity};
pub use element::{Element, NodeId};
pub use enumerate::{check_complete, enumerate};
pub use error::{DagError, Derivable, NotDerivable};
pub use graph::{Edge, Link, WorkflowGraph};
pub use invocation::{Invocation, InvocationId, InvocationState};
pub use value::{DataList, Entry, Resolved};
