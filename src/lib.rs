// ABOUTME: Main library module for the stela workflow engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod codegen;
pub mod dag;
pub mod engine;
pub mod lang;

// Re-export commonly used types
pub use cli::{App, Args};
pub use dag::{
    BuildReport, DagError, DataList, GraphBuilder, Invocation, InvocationId, InvocationState,
    NodeId, NotDerivable, WorkflowGraph,
};
pub use engine::{EngineError, LocalDispatcher, ReportEntry};
pub use lang::{TaskPrototype, WorkflowUnit};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
