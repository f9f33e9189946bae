//! Resolved aspect values and the data points (facts) they are matched against.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::aspect::{Aspect, QName};

/// Identifier of a fact in the candidate collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactId(pub String);

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of a dimension aspect.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionMember {
    Explicit(QName),
    Typed(String),
}

/// A structured object (period, entity identifier, ...) reduced to what the
/// header logic needs: its inner text and whether it carries a forever marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredValue {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub forever: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    QName(QName),
    Dimensions(BTreeSet<QName>),
    Member(DimensionMember),
    Structured(StructuredValue),
    Fact(FactId),
    Sequence(Vec<Value>),
}

impl Value {
    /// The recovery value substituted for a failed text evaluation.
    pub fn empty() -> Self {
        Value::Text(String::new())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }

    pub fn as_qname(&self) -> Option<&QName> {
        match self {
            Value::QName(q) => Some(q),
            Value::Member(DimensionMember::Explicit(q)) => Some(q),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fact(&self) -> Option<&FactId> {
        match self {
            Value::Fact(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_dimensions(&self) -> Option<&BTreeSet<QName>> {
        match self {
            Value::Dimensions(d) => Some(d),
            _ => None,
        }
    }

    /// A one-item sequence collapses to its item, an empty sequence to nothing.
    pub fn flatten(self) -> Option<Value> {
        match self {
            Value::Sequence(mut items) => match items.len() {
                0 => None,
                1 => items.pop().and_then(Value::flatten),
                _ => Some(Value::Sequence(items)),
            },
            other => Some(other),
        }
    }

    /// Effective boolean value, used for boolean recovery contexts.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Text(s) => !s.is_empty(),
            Value::Integer(i) => *i != 0,
            Value::Decimal(d) => *d != 0.0,
            Value::Boolean(b) => *b,
            Value::Sequence(items) => !items.is_empty(),
            Value::Dimensions(d) => !d.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            Value::QName(q) => write!(f, "{}", q),
            Value::Dimensions(dims) => {
                let names: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
            Value::Member(DimensionMember::Explicit(q)) => write!(f, "{}", q),
            Value::Member(DimensionMember::Typed(t)) => write!(f, "{}", t),
            Value::Structured(s) if s.text.is_empty() && s.forever => write!(f, "forever"),
            Value::Structured(s) => write!(f, "{}", s.text),
            Value::Fact(id) => write!(f, "fact({})", id),
            Value::Sequence(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(" "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<QName> for Value {
    fn from(q: QName) -> Self {
        Value::QName(q)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

/// A reported data point, reduced to its aspect values.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub id: FactId,
    pub concept: QName,
    pub aspects: BTreeMap<Aspect, Value>,
    pub dimensions: BTreeMap<QName, DimensionMember>,
    pub is_tuple: bool,
}

impl Fact {
    pub fn new(id: &str, concept: QName) -> Self {
        Self {
            id: FactId(id.to_string()),
            concept,
            aspects: BTreeMap::new(),
            dimensions: BTreeMap::new(),
            is_tuple: false,
        }
    }

    pub fn with_aspect(mut self, aspect: Aspect, value: Value) -> Self {
        self.aspects.insert(aspect, value);
        self
    }

    pub fn with_dimension(mut self, dimension: QName, member: DimensionMember) -> Self {
        self.dimensions.insert(dimension, member);
        self
    }

    /// Explicitly reported value for a dimension, if any.
    pub fn dim_value(&self, dimension: &QName) -> Option<&DimensionMember> {
        self.dimensions.get(dimension)
    }

    pub fn aspect_value(&self, aspect: &Aspect) -> Option<Value> {
        match aspect {
            Aspect::Concept => Some(Value::QName(self.concept.clone())),
            Aspect::Dimensions => Some(Value::Dimensions(self.dimensions.keys().cloned().collect())),
            Aspect::Dimension(q) => self.dimensions.get(q).cloned().map(Value::Member),
            other => self.aspects.get(other).cloned(),
        }
    }
}

/// The candidate facts of a render pass.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    facts: Vec<Fact>,
}

impl FactSet {
    pub fn new(facts: Vec<Fact>) -> Self {
        Self { facts }
    }

    pub fn get(&self, id: &FactId) -> Option<&Fact> {
        self.facts.iter().find(|f| &f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
