// ABOUTME: Dispatch engine module: sandboxes, runners, reports, and the
// ABOUTME: local dispatch loop that drives a graph to completion

pub mod dispatcher;
pub mod error;
pub mod report;
pub mod runner;
pub mod sandbox;

pub use dispatcher::LocalDispatcher;
pub use error::{EngineError, FailureReport, Result};
pub use report::{keys, ReportEntry, ReportHeader};
pub use runner::{InvocationRunner, LocalRunner, PreparedInvocation};
pub use sandbox::{Sandbox, StagedFile, REPORT_FILENAME, SCRIPT_FILENAME, SUCCESS_FILENAME};
