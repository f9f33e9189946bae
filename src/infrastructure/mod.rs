//! Infrastructure layer: collaborator implementations and DI container
//!
//! This layer implements the collaborator boundary traits, loads documents
//! and wires up services.

pub mod di;
pub mod document;
pub mod error;
pub mod expr;
pub mod memory;
pub mod traits;
pub mod validator;

pub use error::{InfraError, InfraResult};
