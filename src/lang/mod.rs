// ABOUTME: Parsed workflow unit model consumed by the graph builder
// ABOUTME: Defines task prototypes, assignments, expressions, and macro expansion

pub mod expression;
pub mod task;
pub mod unit;

pub use expression::{
    expand_expressions, ApplyExpression, Expression, MacroCall, MacroError, StringLiteral,
    MACRO_DEPTH_LIMIT,
};
pub use task::{GroupMode, Language, OutputDecl, ParamDecl, ParamGroup, TaskPrototype, TASK_PARAM};
pub use unit::{Assign, MacroDef, WorkflowUnit};
