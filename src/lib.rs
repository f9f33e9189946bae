//! rendr: resolution engine between a declarative table definition and the
//! rendered table.
//!
//! Structural nodes are instantiated from definition nodes, resolve their
//! aspect values through the cascade, evaluate embedded expressions in
//! nested variable scope and produce headers and sizes for table layout.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
