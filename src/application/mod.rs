//! Application layer: services and use cases
//!
//! This layer orchestrates domain logic through the collaborator traits of
//! the infrastructure layer.

pub mod error;
pub mod error_ext;
pub mod services;

pub use error::{ApplicationError, ApplicationResult, EvaluationFailure};
pub use error_ext::{EvalResultExt, Recovery};
pub use services::{
    EvalRequest, GraphWalker, HeaderRequest, RenderOptions, RenderPass, RenderServices, StructuralTreeBuilder, TableAxes,
};
