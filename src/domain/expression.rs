//! Boundary to the expression engine: compiled programs, the evaluation
//! context shared by a render pass, and the errors both sides can raise.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::error;

use crate::domain::value::Value;

/// An executable program produced by [`ExpressionEngine::compile`].
pub trait CompiledProgram: fmt::Debug + Send + Sync {
    fn source(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

pub type Program = Arc<dyn CompiledProgram>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("compile error in `{source_text}`: {message}")]
pub struct CompileError {
    pub source_text: String,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("undefined variable: ${0}")]
    UndefinedVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("{code}: {message}")]
    Raised { code: String, message: String },

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// The expression engine collaborator.
pub trait ExpressionEngine: Send + Sync {
    fn compile(&self, text: &str) -> Result<Program, CompileError>;

    fn evaluate(&self, program: &Program, ctx: &EvalContext, args: &[Value]) -> Result<Value, EvalError>;
}

/// Mutable evaluation state shared for an entire render pass.
///
/// Variables are pushed and popped strictly in stack discipline by the
/// scoped evaluation walk; the context item is swapped for the duration of a
/// single call only.
#[derive(Debug, Default, Clone)]
pub struct EvalContext {
    variables: BTreeMap<String, Value>,
    context_item: Option<Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Bind `name` unless it is already in scope. Returns whether this call
    /// owns the binding.
    pub fn bind(&mut self, name: &str, value: Value) -> bool {
        if self.variables.contains_key(name) {
            return false;
        }
        self.variables.insert(name.to_string(), value);
        true
    }

    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn context_item(&self) -> Option<&Value> {
        self.context_item.as_ref()
    }

    pub fn context_item_is_fact(&self) -> bool {
        matches!(self.context_item, Some(Value::Fact(_)))
    }

    /// Replace the context item, returning the previous one.
    pub fn replace_context_item(&mut self, item: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.context_item, item)
    }
}

/// Expression text attached to a definition node, compiled once on first use.
#[derive(Debug)]
pub struct Expression {
    source: String,
    program: OnceLock<Result<Program, CompileError>>,
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        Self::new(&self.source)
    }
}

impl Expression {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            program: OnceLock::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_compiled(&self) -> bool {
        self.program.get().is_some()
    }

    /// Compile (once) and return the program. A compile error is logged the
    /// first time only; later calls hand back the same error.
    pub fn program(&self, engine: &dyn ExpressionEngine, owner: &str, role: &str) -> Result<Program, CompileError> {
        self.program
            .get_or_init(|| {
                let compiled = engine.compile(&self.source);
                if let Err(e) = &compiled {
                    error!(node = owner, role, "expression compile failed: {}", e);
                }
                compiled
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_does_not_overwrite_existing_binding() {
        let mut ctx = EvalContext::new();
        assert!(ctx.bind("x", Value::Integer(1)));
        assert!(!ctx.bind("x", Value::Integer(2)));
        assert_eq!(ctx.variable("x"), Some(&Value::Integer(1)));
        ctx.unbind("x");
        assert!(!ctx.is_bound("x"));
    }

    #[test]
    fn test_replace_context_item_returns_previous() {
        let mut ctx = EvalContext::new();
        assert!(ctx.replace_context_item(Some(Value::text("doc"))).is_none());
        assert!(!ctx.context_item_is_fact());
        let prev = ctx.replace_context_item(None);
        assert_eq!(prev, Some(Value::text("doc")));
    }
}
