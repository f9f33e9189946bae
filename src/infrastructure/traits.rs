//! Collaborator boundary traits
//!
//! The resolution engine talks to the relationship-graph store, the label
//! and message resources, the fact-filtering engine and the typed-value
//! validator only through these traits, so services can be tested with
//! in-memory implementations.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Aspect, Edge, Expression, Fact, FilterSpec, QName, RelationshipQuery, Value};

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;
}

/// What the graph store knows about a concept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptInfo {
    #[serde(default)]
    pub is_dimension: bool,
    #[serde(default = "default_true")]
    pub is_item: bool,
}

fn default_true() -> bool {
    true
}

/// Concept/relationship graph store indexing directed labeled edges.
pub trait RelationshipStore: Send + Sync {
    /// Outgoing edges of `source` matching the query's arcroles, link role,
    /// link name and arc name, in storage order.
    fn edges_from(&self, source: &QName, query: &RelationshipQuery) -> Vec<Edge>;

    /// Incoming edges of `target` with one of `arcroles`, in storage order.
    fn edges_to(&self, target: &QName, arcroles: &[String]) -> Vec<Edge>;

    /// Concepts that are the source of a matching edge but the target of
    /// none, in storage order.
    fn roots(&self, query: &RelationshipQuery) -> Vec<QName>;

    fn concept(&self, name: &QName) -> Option<ConceptInfo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Message,
    SelectionMessage,
}

/// A message resource attached to a definition node.
#[derive(Debug, Clone)]
pub struct Message {
    /// Raw text, also the format string.
    pub text: String,
    /// Expression producing the evaluated text, if the message has one.
    pub expression: Option<Expression>,
}

/// Label and message resources.
pub trait LabelStore: Send + Sync {
    fn message(&self, definition: &str, kind: MessageKind, lang: Option<&str>) -> Option<&Message>;

    /// Generic label of a definition node; `None` role is the standard role.
    fn gen_label(&self, definition: &str, role: Option<&str>, lang: Option<&str>) -> Option<String>;

    fn concept_label(&self, concept: &QName, role: &str, lang: Option<&str>) -> Option<String>;
}

/// Fact-filtering engine.
pub trait FactFilter: Send + Sync {
    /// Whether `fact` has the target value for every listed aspect.
    fn aspects_match(&self, fact: &Fact, target: &[(Aspect, Value)]) -> bool;

    /// Keep the facts passing every filter.
    fn apply<'f>(&self, facts: Vec<&'f Fact>, filters: &[FilterSpec]) -> Vec<&'f Fact>;
}

/// Validation state of a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Unknown,
    Invalid,
    None,
    Valid,
    ValidId,
}

/// Result of typing raw text: the state, the typed value (absent when
/// invalid) and the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub state: Validity,
    pub value: Option<Value>,
    pub source: String,
}

impl Validated {
    pub fn is_valid(&self) -> bool {
        matches!(self.state, Validity::Valid | Validity::ValidId)
    }
}

/// Typed-value validator.
pub trait TypedValueValidator: Send + Sync {
    fn validate(&self, type_name: &str, text: &str) -> Validated;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
