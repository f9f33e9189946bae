//! Relationship-graph traversal parameters and results.
//!
//! A traversal yields a nested sequence: every match is an item, and the
//! matches one generation further down are represented as a nested
//! sub-sequence immediately following it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::aspect::QName;
use crate::domain::error::DomainError;

/// Link role meaning "every link role".
pub const ALL_LINKROLES: &str = "XBRL-all-linkroles";
/// Relationship kind meaning "every dimensional arcrole".
pub const ALL_DIMENSION_ARCROLES: &str = "XBRL-dimensions";

pub const ARCROLE_HYPERCUBE_DIMENSION: &str = "http://xbrl.org/int/dim/arcrole/hypercube-dimension";
pub const ARCROLE_DIMENSION_DOMAIN: &str = "http://xbrl.org/int/dim/arcrole/dimension-domain";
pub const ARCROLE_DOMAIN_MEMBER: &str = "http://xbrl.org/int/dim/arcrole/domain-member";
pub const ARCROLE_ALL: &str = "http://xbrl.org/int/dim/arcrole/all";
/// Default arcrole of a concept-relationship node.
pub const ARCROLE_PARENT_CHILD: &str = "http://www.xbrl.org/2003/arcrole/parent-child";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    Child,
    Descendant,
    Parent,
    Ancestor,
    Sibling,
}

impl Axis {
    /// Generation limit when none is declared.
    pub fn default_generations(self) -> u32 {
        match self {
            Axis::Child | Axis::Parent | Axis::Sibling => 1,
            Axis::Descendant | Axis::Ancestor => 0,
        }
    }

    pub fn is_upward(self) -> bool {
        matches!(self, Axis::Parent | Axis::Ancestor)
    }
}

/// Traversal axis with its optional `-or-self` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisSpec {
    pub axis: Axis,
    pub or_self: bool,
}

impl AxisSpec {
    pub fn new(axis: Axis, or_self: bool) -> Self {
        Self { axis, or_self }
    }
}

impl Default for AxisSpec {
    fn default() -> Self {
        Self::new(Axis::Descendant, false)
    }
}

impl FromStr for AxisSpec {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, or_self) = match s.strip_suffix("-or-self") {
            Some(base) => (base, true),
            None => (s, false),
        };
        let axis = match base {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "sibling" => Axis::Sibling,
            _ => return Err(DomainError::InvalidName(s.to_string())),
        };
        Ok(Self { axis, or_self })
    }
}

impl fmt::Display for AxisSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.axis {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::Sibling => "sibling",
        };
        if self.or_self {
            write!(f, "{}-or-self", base)
        } else {
            write!(f, "{}", base)
        }
    }
}

/// A directed labeled edge in the relationship graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: QName,
    pub to: QName,
    pub arcrole: String,
    pub link_role: String,
    #[serde(default)]
    pub target_role: Option<String>,
    #[serde(default)]
    pub link_name: Option<QName>,
    #[serde(default)]
    pub arc_name: Option<QName>,
    #[serde(default)]
    pub order: f64,
}

impl Edge {
    /// Link role in which the next hop must continue.
    pub fn consecutive_link_role(&self) -> &str {
        self.target_role.as_deref().unwrap_or(&self.link_role)
    }
}

/// Fully evaluated traversal parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipQuery {
    /// `None` is the virtual root: start from the graph roots.
    pub source: Option<QName>,
    /// `None` matches every link role.
    pub link_role: Option<String>,
    pub arcroles: Vec<String>,
    pub axis: AxisSpec,
    /// 0 means unlimited.
    pub generations: u32,
    pub link_name: Option<QName>,
    pub arc_name: Option<QName>,
}

impl RelationshipQuery {
    pub fn new(source: Option<QName>, arcrole: &str) -> Self {
        Self {
            source,
            link_role: None,
            arcroles: vec![arcrole.to_string()],
            axis: AxisSpec::default(),
            generations: 0,
            link_name: None,
            arc_name: None,
        }
    }

    pub fn with_axis(mut self, axis: AxisSpec) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_generations(mut self, generations: u32) -> Self {
        self.generations = generations;
        self
    }

    pub fn with_link_role(mut self, link_role: Option<&str>) -> Self {
        self.link_role = link_role.filter(|r| *r != ALL_LINKROLES).map(str::to_string);
        self
    }

    pub fn with_arcroles(mut self, arcroles: Vec<String>) -> Self {
        self.arcroles = arcroles;
        self
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        self.arcroles.iter().any(|a| a == &edge.arcrole)
            && self.link_role.as_ref().map_or(true, |r| r == &edge.link_role)
            && self.link_name.as_ref().map_or(true, |n| edge.link_name.as_ref() == Some(n))
            && self.arc_name.as_ref().map_or(true, |n| edge.arc_name.as_ref() == Some(n))
    }
}

/// One element of a nested traversal result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelNode {
    Item(QName),
    Nested(Vec<RelNode>),
}

impl RelNode {
    pub fn item(&self) -> Option<&QName> {
        match self {
            RelNode::Item(q) => Some(q),
            RelNode::Nested(_) => None,
        }
    }
}

/// Count and maximum nesting level of a traversal result.
///
/// Every item counts 1; a nested sub-sequence adds its own count and makes
/// the depth one more than its own depth. With `include_self` the source is
/// counted once more and adds a level. An empty result without
/// `include_self` is `(0, 0)`.
pub fn cardinality_and_depth(nested: &[RelNode], include_self: bool) -> (usize, usize) {
    if nested.is_empty() {
        return if include_self { (1, 1) } else { (0, 0) };
    }
    let (mut count, depth) = len_depth(nested);
    let mut depth = depth;
    if include_self {
        count += 1;
        depth += 1;
    }
    (count, depth)
}

fn len_depth(nested: &[RelNode]) -> (usize, usize) {
    let mut count = 0;
    let mut depth = 1;
    for rel in nested {
        match rel {
            RelNode::Item(_) => count += 1,
            RelNode::Nested(sub) => {
                let (sub_count, sub_depth) = len_depth(sub);
                count += sub_count;
                depth = depth.max(sub_depth + 1);
            }
        }
    }
    (count, depth)
}

/// Flatten a nested result into its items, preorder.
pub fn flatten(nested: &[RelNode]) -> Vec<&QName> {
    let mut out = Vec::new();
    for rel in nested {
        match rel {
            RelNode::Item(q) => out.push(q),
            RelNode::Nested(sub) => out.extend(flatten(sub)),
        }
    }
    out
}
