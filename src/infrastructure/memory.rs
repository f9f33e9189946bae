//! In-memory collaborator implementations
//!
//! Used by the document loader and by tests.

use std::collections::HashMap;

use tracing::trace;

use crate::config::STANDARD_LABEL_ROLE;
use crate::domain::{Aspect, Edge, Fact, FilterSpec, QName, RelationshipQuery, Value};
use crate::infrastructure::traits::{ConceptInfo, FactFilter, LabelStore, Message, MessageKind, RelationshipStore};

// ============================================================
// RELATIONSHIP GRAPH
// ============================================================

/// Edge list graph; storage order is insertion order.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    edges: Vec<Edge>,
    concepts: HashMap<QName, ConceptInfo>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.add_edge(edge);
        self
    }

    pub fn with_concept(mut self, name: QName, info: ConceptInfo) -> Self {
        self.add_concept(name, info);
        self
    }

    pub fn add_edge(&mut self, edge: Edge) {
        // Every endpoint is a known concept, an item unless declared otherwise.
        for name in [&edge.from, &edge.to] {
            self.concepts.entry(name.clone()).or_insert(ConceptInfo {
                is_dimension: false,
                is_item: true,
            });
        }
        self.edges.push(edge);
    }

    pub fn add_concept(&mut self, name: QName, info: ConceptInfo) {
        self.concepts.insert(name, info);
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

impl RelationshipStore for MemoryGraph {
    fn edges_from(&self, source: &QName, query: &RelationshipQuery) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| &e.from == source && query.matches(e))
            .cloned()
            .collect()
    }

    fn edges_to(&self, target: &QName, arcroles: &[String]) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| &e.to == target && arcroles.iter().any(|a| a == &e.arcrole))
            .cloned()
            .collect()
    }

    fn roots(&self, query: &RelationshipQuery) -> Vec<QName> {
        let matching: Vec<&Edge> = self.edges.iter().filter(|e| query.matches(e)).collect();
        let mut roots: Vec<QName> = Vec::new();
        for edge in &matching {
            let is_target = matching.iter().any(|e| e.to == edge.from);
            if !is_target && !roots.contains(&edge.from) {
                roots.push(edge.from.clone());
            }
        }
        trace!("roots: {} for {} matching edges", roots.len(), matching.len());
        roots
    }

    fn concept(&self, name: &QName) -> Option<ConceptInfo> {
        self.concepts.get(name).copied()
    }
}

// ============================================================
// LABELS AND MESSAGES
// ============================================================

#[derive(Debug, Clone)]
struct LabelEntry {
    owner: String,
    role: String,
    lang: Option<String>,
    text: String,
}

#[derive(Debug, Clone)]
struct MessageEntry {
    owner: String,
    kind: MessageKind,
    lang: Option<String>,
    message: Message,
}

/// Label resources. A lookup without a language matches any language;
/// a lookup with one requires an exact match (no fallback to other
/// languages). Entries stored without a language match every lookup.
#[derive(Debug, Default)]
pub struct MemoryLabels {
    gen_labels: Vec<LabelEntry>,
    concept_labels: Vec<LabelEntry>,
    messages: Vec<MessageEntry>,
}

fn lang_matches(entry: Option<&str>, requested: Option<&str>) -> bool {
    match (entry, requested) {
        (None, _) | (_, None) => true,
        (Some(have), Some(want)) => have == want,
    }
}

impl MemoryLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// `role` defaults to the standard label role.
    pub fn add_gen_label(&mut self, definition: &str, role: Option<&str>, lang: Option<&str>, text: &str) {
        self.gen_labels.push(LabelEntry {
            owner: definition.to_string(),
            role: role.unwrap_or(STANDARD_LABEL_ROLE).to_string(),
            lang: lang.map(str::to_string),
            text: text.to_string(),
        });
    }

    pub fn add_concept_label(&mut self, concept: &QName, role: Option<&str>, lang: Option<&str>, text: &str) {
        self.concept_labels.push(LabelEntry {
            owner: concept.to_string(),
            role: role.unwrap_or(STANDARD_LABEL_ROLE).to_string(),
            lang: lang.map(str::to_string),
            text: text.to_string(),
        });
    }

    pub fn add_message(&mut self, definition: &str, kind: MessageKind, lang: Option<&str>, message: Message) {
        self.messages.push(MessageEntry {
            owner: definition.to_string(),
            kind,
            lang: lang.map(str::to_string),
            message,
        });
    }

    fn find_label<'a>(entries: &'a [LabelEntry], owner: &str, role: &str, lang: Option<&str>) -> Option<&'a str> {
        entries
            .iter()
            .find(|e| e.owner == owner && e.role == role && lang_matches(e.lang.as_deref(), lang))
            .map(|e| e.text.as_str())
    }
}

impl LabelStore for MemoryLabels {
    fn message(&self, definition: &str, kind: MessageKind, lang: Option<&str>) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.owner == definition && m.kind == kind && lang_matches(m.lang.as_deref(), lang))
            .map(|m| &m.message)
    }

    fn gen_label(&self, definition: &str, role: Option<&str>, lang: Option<&str>) -> Option<String> {
        let role = role.unwrap_or(STANDARD_LABEL_ROLE);
        Self::find_label(&self.gen_labels, definition, role, lang).map(str::to_string)
    }

    fn concept_label(&self, concept: &QName, role: &str, lang: Option<&str>) -> Option<String> {
        Self::find_label(&self.concept_labels, &concept.to_string(), role, lang).map(str::to_string)
    }
}

// ============================================================
// FACT FILTER
// ============================================================

/// Matches facts by comparing aspect values: names by QName, everything
/// else by display text.
#[derive(Debug, Default)]
pub struct AspectFactFilter;

impl AspectFactFilter {
    fn value_matches(actual: &Value, target: &Value) -> bool {
        match (actual.as_qname(), target.as_qname()) {
            (Some(a), Some(t)) => a == t,
            _ => actual.to_string() == target.to_string(),
        }
    }

    fn passes(fact: &Fact, filter: &FilterSpec) -> bool {
        let actual = fact.aspect_value(&filter.aspect);
        let hit = match &actual {
            None => false,
            Some(_) if filter.values.is_empty() => true,
            Some(value) => {
                let text = match value.as_qname() {
                    Some(q) => q.to_string(),
                    None => value.to_string(),
                };
                filter.values.iter().any(|v| v.trim() == text)
            }
        };
        hit != filter.complement
    }
}

impl FactFilter for AspectFactFilter {
    fn aspects_match(&self, fact: &Fact, target: &[(Aspect, Value)]) -> bool {
        target.iter().all(|(aspect, value)| match aspect {
            // A dimension set constrains which dimensions must be reported.
            Aspect::Dimensions => value
                .as_dimensions()
                .map_or(true, |dims| dims.iter().all(|d| fact.dim_value(d).is_some())),
            Aspect::OmitDimensions => true,
            other => fact
                .aspect_value(other)
                .is_some_and(|actual| Self::value_matches(&actual, value)),
        })
    }

    fn apply<'f>(&self, facts: Vec<&'f Fact>, filters: &[FilterSpec]) -> Vec<&'f Fact> {
        facts
            .into_iter()
            .filter(|fact| filters.iter().all(|f| Self::passes(fact, f)))
            .collect()
    }
}
