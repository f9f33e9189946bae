//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, EvalError};

/// A failed evaluation, carrying the definition node and expression role
/// it happened in. Call sites pick the recovery value.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("evaluation of {role} on {node} failed: {source}")]
pub struct EvaluationFailure {
    pub node: String,
    pub role: String,
    #[source]
    pub source: EvalError,
}

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Evaluation(#[from] EvaluationFailure),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
