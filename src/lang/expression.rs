// ABOUTME: Right-hand-side expression model for assignments and apply parameters
// ABOUTME: Implements terminating structural macro expansion over expression lists

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::unit::MacroDef;

/// Expansion depth cap; exceeding it means a macro (directly or indirectly)
/// invokes itself.
pub const MACRO_DEPTH_LIMIT: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// A literal string, optionally denoting a file that must exist on disk.
    Str(StringLiteral),
    /// A reference to a named junction or a task prototype.
    Id(String),
    /// A call site binding prototype parameters to upstream values.
    Apply(ApplyExpression),
    /// A macro invocation; erased by expansion before graph construction.
    Macro(MacroCall),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StringLiteral {
    pub value: String,
    #[serde(default)]
    pub stage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplyExpression {
    pub params: IndexMap<String, Vec<Expression>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroCall {
    pub name: String,
    #[serde(default)]
    pub args: IndexMap<String, Vec<Expression>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum MacroError {
    #[error("macro '{0}' is not defined")]
    Unknown(String),

    #[error("macro '{name}' expects parameters {expected:?} but was given {given:?}")]
    ArityMismatch {
        name: String,
        expected: Vec<String>,
        given: Vec<String>,
    },

    #[error("macro expansion exceeded the nesting limit at '{0}'; recursive macro?")]
    DepthExceeded(String),
}

/// Expands every macro invocation in `exprs` into plain apply/id/string
/// expressions. The result never contains a `Macro` variant.
pub fn expand_expressions(
    exprs: &[Expression],
    macros: &IndexMap<String, MacroDef>,
) -> Result<Vec<Expression>, MacroError> {
    expand(exprs, macros, &IndexMap::new(), 0)
}

fn expand(
    exprs: &[Expression],
    macros: &IndexMap<String, MacroDef>,
    bindings: &IndexMap<String, Vec<Expression>>,
    depth: usize,
) -> Result<Vec<Expression>, MacroError> {
    let mut out = Vec::with_capacity(exprs.len());

    for expr in exprs {
        match expr {
            Expression::Str(_) => out.push(expr.clone()),

            Expression::Id(name) => match bindings.get(name) {
                // A formal parameter splices its (already expanded) argument list.
                Some(substitution) => out.extend(substitution.iter().cloned()),
                None => out.push(expr.clone()),
            },

            Expression::Apply(apply) => {
                let mut params = IndexMap::with_capacity(apply.params.len());
                for (param, list) in &apply.params {
                    params.insert(param.clone(), expand(list, macros, bindings, depth)?);
                }
                out.push(Expression::Apply(ApplyExpression { params }));
            }

            Expression::Macro(call) => {
                if depth >= MACRO_DEPTH_LIMIT {
                    return Err(MacroError::DepthExceeded(call.name.clone()));
                }

                let def = macros
                    .get(&call.name)
                    .ok_or_else(|| MacroError::Unknown(call.name.clone()))?;

                let expected: Vec<String> = def.params.clone();
                let given: Vec<String> = call.args.keys().cloned().collect();
                if expected.len() != given.len()
                    || !expected.iter().all(|p| call.args.contains_key(p))
                {
                    return Err(MacroError::ArityMismatch {
                        name: call.name.clone(),
                        expected,
                        given,
                    });
                }

                let mut inner = IndexMap::with_capacity(def.params.len());
                for formal in &def.params {
                    let arg = expand(&call.args[formal], macros, bindings, depth)?;
                    inner.insert(formal.clone(), arg);
                }

                out.extend(expand(&def.exprs, macros, &inner, depth + 1)?);
            }
        }
    }

    Ok(out)
}

impl Expression {
    pub fn literal(value: &str) -> Self {
        Expression::Str(StringLiteral {
            value: value.to_string(),
            stage: false,
        })
    }

    pub fn file(value: &str) -> Self {
        Expression::Str(StringLiteral {
            value: value.to_string(),
            stage: true,
        })
    }

    pub fn id(name: &str) -> Self {
        Expression::Id(name.to_string())
    }
}
