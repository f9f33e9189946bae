//! Recovery helpers for evaluation results
//!
//! Evaluation failures never abort a render pass: every call site states the
//! neutral value that stands in for the failed result.

use crate::application::EvaluationFailure;
use crate::domain::Value;

/// Neutral value substituted for a failed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Empty string, for text, header and aspect contexts.
    Text,
    Boolean,
    Integer,
    /// No value at all (relationship parameters, selections).
    Absent,
}

impl Recovery {
    pub fn value(self) -> Option<Value> {
        match self {
            Recovery::Text => Some(Value::empty()),
            Recovery::Boolean => Some(Value::Boolean(false)),
            Recovery::Integer => Some(Value::Integer(0)),
            Recovery::Absent => None,
        }
    }
}

/// Extension trait for converting an evaluation result into a value.
pub trait EvalResultExt {
    /// Replace a failure with the recovery value.
    ///
    /// # Example
    /// ```ignore
    /// pass.evaluate(ctx, node, None, request)
    ///     .recover(Recovery::Text);
    /// ```
    fn recover(self, recovery: Recovery) -> Option<Value>;
}

impl EvalResultExt for Result<Value, EvaluationFailure> {
    fn recover(self, recovery: Recovery) -> Option<Value> {
        match self {
            Ok(value) => Some(value),
            Err(_) => recovery.value(),
        }
    }
}
