//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent structural invariant violations and malformed
/// definitions. They are programming errors for the render pass: callers
/// propagate them and abort, they are never degraded to a recovery value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("unknown definition node: {0}")]
    UnknownDefinition(String),

    #[error("unknown structural node: {0}")]
    UnknownNode(String),

    #[error("structural node {0} has no choice alternatives")]
    NoChoices(String),

    #[error("choice index {index} out of range for {node} ({count} alternatives)")]
    ChoiceOutOfRange {
        node: String,
        index: usize,
        count: usize,
    },

    #[error("structural node {0} already has a parent")]
    AlreadyParented(String),

    #[error("roll-up node {rollup} is not a child of {node}")]
    RollUpNotChild { node: String, rollup: String },

    #[error("cycle detected in definition tree at: {0}")]
    CycleDetected(String),

    #[error("invalid definition {node}: {message}")]
    InvalidDefinition { node: String, message: String },
}
