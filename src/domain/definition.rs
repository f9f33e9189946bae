//! Definition nodes: the immutable, parsed table definition.
//!
//! Nodes live in a [`DefinitionModel`] arena and reference each other by
//! [`DefinitionId`]. The twelve node kinds are a closed sum type; every
//! per-kind rule is dispatched by matching on [`NodeKind`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use generational_arena::{Arena, Index};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::aspect::{Aspect, QName};
use crate::domain::constraint::ConstraintSets;
use crate::domain::error::DomainError;
use crate::domain::expression::{Expression, ExpressionEngine};
use crate::domain::relationship::AxisSpec;
use crate::domain::value::Value;

pub type DefinitionId = Index;

/// Which axis of the rendered table a breakdown populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordinate {
    #[default]
    X,
    Y,
    Z,
}

impl fmt::Display for Ordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ordinate::X => write!(f, "x"),
            Ordinate::Y => write!(f, "y"),
            Ordinate::Z => write!(f, "z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParentChildOrder {
    #[default]
    ParentFirst,
    ChildrenFirst,
}

/// A relationship-node parameter: a literal, an expression evaluated per
/// structural node, or nothing.
#[derive(Debug, Clone)]
pub enum Param<T> {
    Absent,
    Literal(T),
    Expression(Expression),
}

impl<T> Default for Param<T> {
    fn default() -> Self {
        Param::Absent
    }
}

impl<T> Param<T> {
    pub fn literal(&self) -> Option<&T> {
        match self {
            Param::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn expression(&self) -> Option<&Expression> {
        match self {
            Param::Expression(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Param::Absent)
    }
}

/// Traversal parameters shared by both relationship node kinds.
#[derive(Debug, Clone, Default)]
pub struct RelationshipSpec {
    pub source: Param<QName>,
    pub link_role: Param<String>,
    pub axis: Param<AxisSpec>,
    pub generations: Param<u32>,
}

impl RelationshipSpec {
    /// The axis when it is declared literally; `descendant` when absent.
    pub fn static_axis(&self) -> Option<AxisSpec> {
        match &self.axis {
            Param::Literal(axis) => Some(*axis),
            Param::Absent => Some(AxisSpec::default()),
            Param::Expression(_) => None,
        }
    }

    fn expressions(&self) -> Vec<(&'static str, &Expression)> {
        let mut out = Vec::new();
        if let Some(e) = self.source.expression() {
            out.push(("relationshipSourceExpression", e));
        }
        if let Some(e) = self.link_role.expression() {
            out.push(("linkroleExpression", e));
        }
        if let Some(e) = self.axis.expression() {
            out.push(("axisExpression", e));
        }
        if let Some(e) = self.generations.expression() {
            out.push(("generationsExpression", e));
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConceptRelationshipNode {
    pub rel: RelationshipSpec,
    pub arcrole: Param<String>,
    pub link_name: Param<QName>,
    pub arc_name: Param<QName>,
}

#[derive(Debug, Clone, Default)]
pub struct DimensionRelationshipNode {
    pub rel: RelationshipSpec,
    pub dimension: Param<QName>,
}

#[derive(Debug, Clone)]
pub struct SelectionNode {
    pub select: Expression,
    pub covered: Aspect,
    pub variable: String,
}

/// A single aspect test attached to a filter, aspect or table node.
///
/// The filter accepts a fact when its value for `aspect` is one of `values`
/// (any value when `values` is empty); `complement` inverts the test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub aspect: Aspect,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default = "default_cover")]
    pub cover: bool,
    #[serde(default)]
    pub complement: bool,
}

fn default_cover() -> bool {
    true
}

impl FilterSpec {
    pub fn is_concept_name(&self) -> bool {
        self.aspect == Aspect::Concept
    }
}

/// Order filters so that concept-name filters come first, keeping the
/// relative order within each group.
pub fn order_filters(filters: Vec<FilterSpec>) -> Vec<FilterSpec> {
    let (mut ordered, rest): (Vec<_>, Vec<_>) = filters.into_iter().partition(FilterSpec::is_concept_name);
    ordered.extend(rest);
    ordered
}

#[derive(Debug, Clone, Default)]
pub struct FilterNode {
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone)]
pub struct AspectNode {
    pub aspect: Aspect,
    pub include_unreported: bool,
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone)]
pub struct TableNode {
    pub parameters: Vec<(String, Value)>,
    pub filters: Vec<FilterSpec>,
    pub aspect_model: String,
}

impl Default for TableNode {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            filters: Vec::new(),
            aspect_model: "dimensional".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EuAxisCoord {
    pub primary_item: Option<QName>,
    pub time_reference: Option<String>,
    pub dim_coords: Vec<(QName, QName)>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Table(TableNode),
    Breakdown { ordinate: Ordinate },
    Rule { sets: ConstraintSets },
    Tuple { sets: ConstraintSets },
    Composition,
    ConceptRelationship(ConceptRelationshipNode),
    DimensionRelationship(DimensionRelationshipNode),
    Selection(SelectionNode),
    Filter(FilterNode),
    Aspect(AspectNode),
    EuTable,
    EuAxisCoord(EuAxisCoord),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Table(_) => "table",
            NodeKind::Breakdown { .. } => "breakdown",
            NodeKind::Rule { .. } => "ruleNode",
            NodeKind::Tuple { .. } => "tupleNode",
            NodeKind::Composition => "compositionNode",
            NodeKind::ConceptRelationship(_) => "conceptRelationshipNode",
            NodeKind::DimensionRelationship(_) => "dimensionRelationshipNode",
            NodeKind::Selection(_) => "selectionNode",
            NodeKind::Filter(_) => "filterNode",
            NodeKind::Aspect(_) => "aspectNode",
            NodeKind::EuTable => "euTable",
            NodeKind::EuAxisCoord(_) => "axisCoord",
        }
    }

    /// Closed nodes carry their own aspect values; open ones take them from facts.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            NodeKind::Rule { .. }
                | NodeKind::Tuple { .. }
                | NodeKind::Composition
                | NodeKind::ConceptRelationship(_)
                | NodeKind::DimensionRelationship(_)
        )
    }

    pub fn is_table(&self) -> bool {
        matches!(self, NodeKind::Table(_) | NodeKind::EuTable)
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, NodeKind::ConceptRelationship(_) | NodeKind::DimensionRelationship(_))
    }

    pub fn relationship_spec(&self) -> Option<&RelationshipSpec> {
        match self {
            NodeKind::ConceptRelationship(n) => Some(&n.rel),
            NodeKind::DimensionRelationship(n) => Some(&n.rel),
            _ => None,
        }
    }

    pub fn filters(&self) -> &[FilterSpec] {
        match self {
            NodeKind::Filter(n) => &n.filters,
            NodeKind::Aspect(n) => &n.filters,
            NodeKind::Table(t) => &t.filters,
            _ => &[],
        }
    }
}

/// One node of the parsed table definition.
#[derive(Debug, Clone)]
pub struct DefinitionNode {
    pub id: String,
    pub parent: Option<DefinitionId>,
    pub children: Vec<DefinitionId>,
    pub abstract_flag: bool,
    pub roll_up: bool,
    pub merge: bool,
    pub tag_selector: Option<String>,
    pub parent_child_order: Option<ParentChildOrder>,
    pub value_expression: Option<Expression>,
    pub kind: NodeKind,
}

impl DefinitionNode {
    pub fn new(id: &str, kind: NodeKind) -> Self {
        Self {
            id: id.to_string(),
            parent: None,
            children: Vec::new(),
            abstract_flag: false,
            roll_up: false,
            merge: false,
            tag_selector: None,
            parent_child_order: None,
            value_expression: None,
            kind,
        }
    }

    pub fn with_abstract(mut self, flag: bool) -> Self {
        self.abstract_flag = flag;
        self
    }

    pub fn with_roll_up(mut self, flag: bool) -> Self {
        self.roll_up = flag;
        self
    }

    pub fn with_merge(mut self, flag: bool) -> Self {
        self.merge = flag;
        self
    }

    pub fn with_tag_selector(mut self, tag: &str) -> Self {
        self.tag_selector = Some(tag.to_string());
        self
    }

    pub fn with_parent_child_order(mut self, order: ParentChildOrder) -> Self {
        self.parent_child_order = Some(order);
        self
    }

    pub fn with_value_expression(mut self, text: &str) -> Self {
        self.value_expression = Some(Expression::new(text));
        self
    }

    pub fn is_abstract(&self) -> bool {
        match &self.kind {
            NodeKind::Composition => true,
            NodeKind::Rule { .. }
            | NodeKind::Tuple { .. }
            | NodeKind::ConceptRelationship(_)
            | NodeKind::DimensionRelationship(_)
            | NodeKind::EuAxisCoord(_) => self.abstract_flag,
            _ => false,
        }
    }

    pub fn is_roll_up(&self) -> bool {
        match &self.kind {
            NodeKind::EuAxisCoord(_) | NodeKind::Table(_) | NodeKind::EuTable => false,
            _ => self.roll_up,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self.kind, NodeKind::Rule { .. } | NodeKind::Tuple { .. }) && self.merge
    }

    pub fn parent_child_order(&self) -> ParentChildOrder {
        self.parent_child_order.unwrap_or_default()
    }

    /// Tagged rule sets; only rule and tuple nodes have them.
    pub fn constraint_sets(&self) -> Option<&ConstraintSets> {
        match &self.kind {
            NodeKind::Rule { sets } | NodeKind::Tuple { sets } => Some(sets),
            _ => None,
        }
    }

    pub fn has_value_expression(&self) -> bool {
        self.value_expression
            .as_ref()
            .is_some_and(|e| !e.source().trim().is_empty())
    }

    /// Dimension statically named by a dimension-relationship node.
    pub fn dimension_literal(&self) -> Option<&QName> {
        match &self.kind {
            NodeKind::DimensionRelationship(n) => n.dimension.literal(),
            _ => None,
        }
    }

    /// Aspects this node declares, in declaration order.
    ///
    /// `covered_dimension` is the resolved dimension of a
    /// dimension-relationship node; other kinds ignore it.
    pub fn aspects_covered(&self, covered_dimension: Option<&QName>) -> Vec<Aspect> {
        match &self.kind {
            NodeKind::Rule { sets } => sets.aspects_covered(),
            NodeKind::Tuple { .. } => vec![Aspect::Location],
            NodeKind::ConceptRelationship(_) => vec![Aspect::Concept],
            NodeKind::DimensionRelationship(n) => covered_dimension
                .or(n.dimension.literal())
                .map(|d| vec![Aspect::Dimension(d.clone())])
                .unwrap_or_default(),
            NodeKind::Selection(s) => vec![s.covered.clone()],
            NodeKind::Filter(n) => with_dimensions_marker(
                n.filters.iter().filter(|f| f.cover).map(|f| f.aspect.clone()),
            ),
            NodeKind::Aspect(n) => with_dimensions_marker(std::iter::once(n.aspect.clone())),
            NodeKind::EuAxisCoord(c) => {
                let mut covered = Vec::new();
                if c.primary_item.is_some() {
                    covered.push(Aspect::Concept);
                }
                if c.time_reference.is_some() {
                    covered.push(Aspect::Instant);
                }
                covered.extend(c.dim_coords.iter().map(|(d, _)| Aspect::Dimension(d.clone())));
                covered
            }
            NodeKind::Table(_) | NodeKind::EuTable | NodeKind::Breakdown { .. } | NodeKind::Composition => {
                Vec::new()
            }
        }
    }

    /// Whether this node itself can supply `aspect`.
    pub fn has_aspect(&self, aspect: &Aspect, covered_dimension: Option<&QName>) -> bool {
        match &self.kind {
            NodeKind::Rule { sets } => sets.has_aspect(aspect),
            NodeKind::Tuple { .. } => *aspect == Aspect::Location,
            NodeKind::ConceptRelationship(_) => *aspect == Aspect::Concept,
            NodeKind::DimensionRelationship(n) => {
                *aspect == Aspect::Dimensions
                    || covered_dimension
                        .or(n.dimension.literal())
                        .is_some_and(|d| aspect.dimension() == Some(d))
            }
            NodeKind::Selection(s) => {
                *aspect == s.covered || (s.covered.is_dimension() && *aspect == Aspect::Dimensions)
            }
            NodeKind::Filter(_) | NodeKind::Aspect(_) => self.aspects_covered(None).contains(aspect),
            NodeKind::EuAxisCoord(c) => match aspect {
                Aspect::Concept => c.primary_item.is_some(),
                Aspect::Dimensions => !c.dim_coords.is_empty(),
                Aspect::PeriodType | Aspect::Instant => c.time_reference.is_some(),
                Aspect::Dimension(q) => c.dim_coords.iter().any(|(d, _)| d == q),
                _ => false,
            },
            NodeKind::Table(_) | NodeKind::EuTable | NodeKind::Breakdown { .. } | NodeKind::Composition => false,
        }
    }

    /// Dimensions a non-rule node contributes to the DIMENSIONS aspect.
    pub fn dimensions_covered(&self, covered_dimension: Option<&QName>) -> BTreeSet<QName> {
        match &self.kind {
            NodeKind::DimensionRelationship(n) => covered_dimension.or(n.dimension.literal()).cloned().into_iter().collect(),
            NodeKind::Selection(s) => s.covered.dimension().cloned().into_iter().collect(),
            NodeKind::Filter(_) | NodeKind::Aspect(_) => self
                .aspects_covered(None)
                .into_iter()
                .filter_map(|a| a.dimension().cloned())
                .collect(),
            NodeKind::EuAxisCoord(c) => c.dim_coords.iter().map(|(d, _)| d.clone()).collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Every expression this node owns, with the role it is reported under.
    pub fn expressions(&self) -> Vec<(&'static str, &Expression)> {
        let mut out = Vec::new();
        if let Some(e) = &self.value_expression {
            out.push(("value", e));
        }
        match &self.kind {
            NodeKind::ConceptRelationship(n) => {
                out.extend(n.rel.expressions());
                if let Some(e) = n.arcrole.expression() {
                    out.push(("arcroleExpression", e));
                }
                if let Some(e) = n.link_name.expression() {
                    out.push(("linknameExpression", e));
                }
                if let Some(e) = n.arc_name.expression() {
                    out.push(("arcnameExpression", e));
                }
            }
            NodeKind::DimensionRelationship(n) => {
                out.extend(n.rel.expressions());
                if let Some(e) = n.dimension.expression() {
                    out.push(("dimensionExpression", e));
                }
            }
            NodeKind::Selection(s) => out.push(("select", &s.select)),
            _ => {}
        }
        out
    }

    /// Compile every embedded expression. Idempotent: programs are memoized,
    /// and a compile error is reported once.
    pub fn compile(&self, engine: &dyn ExpressionEngine) {
        for (role, expr) in self.expressions() {
            let _ = expr.program(engine, &self.id, role);
        }
        if let Some(sets) = self.constraint_sets() {
            sets.compile(engine, &self.id);
        }
    }
}

fn with_dimensions_marker(aspects: impl Iterator<Item = Aspect>) -> Vec<Aspect> {
    let mut covered: Vec<Aspect> = Vec::new();
    for aspect in aspects {
        if !covered.contains(&aspect) {
            covered.push(aspect);
        }
    }
    if covered.iter().any(Aspect::is_dimension) {
        covered.push(Aspect::Dimensions);
    }
    covered
}

/// Arena holding every definition node of a loaded document.
#[derive(Debug, Default)]
pub struct DefinitionModel {
    arena: Arena<DefinitionNode>,
    ids: HashMap<String, DefinitionId>,
    tables: Vec<DefinitionId>,
}

impl DefinitionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node below `parent`. Ids must be unique.
    #[instrument(level = "trace", skip(self, node), fields(id = %node.id))]
    pub fn insert(&mut self, mut node: DefinitionNode, parent: Option<DefinitionId>) -> Result<DefinitionId, DomainError> {
        if self.ids.contains_key(&node.id) {
            return Err(DomainError::InvalidDefinition {
                node: node.id,
                message: "duplicate id".to_string(),
            });
        }
        if let Some(p) = parent {
            if !self.arena.contains(p) {
                return Err(DomainError::UnknownDefinition(format!("{:?}", p)));
            }
        }
        node.parent = parent;
        node.children.clear();
        let id = node.id.clone();
        let is_table = node.kind.is_table();
        let idx = self.arena.insert(node);
        if let Some(p) = parent {
            if let Some(parent_node) = self.arena.get_mut(p) {
                parent_node.children.push(idx);
            }
        }
        if is_table {
            self.tables.push(idx);
        }
        self.ids.insert(id, idx);
        Ok(idx)
    }

    pub fn get(&self, id: DefinitionId) -> Option<&DefinitionNode> {
        self.arena.get(id)
    }

    pub fn node(&self, id: DefinitionId) -> Result<&DefinitionNode, DomainError> {
        self.arena
            .get(id)
            .ok_or_else(|| DomainError::UnknownDefinition(format!("{:?}", id)))
    }

    pub fn find(&self, id: &str) -> Option<DefinitionId> {
        self.ids.get(id).copied()
    }

    pub fn tables(&self) -> &[DefinitionId] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefinitionId, &DefinitionNode)> {
        self.arena.iter()
    }

    /// The table (or EU table) a node belongs to.
    pub fn table_of(&self, id: DefinitionId) -> Option<DefinitionId> {
        let mut current = Some(id);
        while let Some(idx) = current {
            let node = self.arena.get(idx)?;
            if node.kind.is_table() {
                return Some(idx);
            }
            current = node.parent;
        }
        None
    }

    /// Named constants of a table; EU tables have none.
    pub fn parameters(&self, table: DefinitionId) -> &[(String, Value)] {
        match self.arena.get(table).map(|n| &n.kind) {
            Some(NodeKind::Table(t)) => &t.parameters,
            _ => &[],
        }
    }

    pub fn breakdowns(&self, table: DefinitionId) -> Vec<(Ordinate, DefinitionId)> {
        let Some(node) = self.arena.get(table) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|&c| match self.arena.get(c).map(|n| &n.kind) {
                Some(NodeKind::Breakdown { ordinate }) => Some((*ordinate, c)),
                _ => None,
            })
            .collect()
    }

    /// Non-DIMENSIONS aspects declared in any tagged constraint set of any
    /// rule node under `table`.
    pub fn aspects_in_tagged_constraint_sets(&self, table: DefinitionId) -> BTreeSet<Aspect> {
        self.arena
            .iter()
            .filter(|(idx, _)| self.table_of(*idx) == Some(table))
            .filter_map(|(_, n)| n.constraint_sets())
            .flat_map(|s| s.aspects_in_tagged_sets())
            .collect()
    }

    #[instrument(level = "debug", skip(self, engine))]
    pub fn compile(&self, engine: &dyn ExpressionEngine) {
        for (_, node) in self.arena.iter() {
            node.compile(engine);
        }
        debug!("compiled {} definition nodes", self.arena.len());
    }

    /// Static value of an EU axis coordinate, inheriting from the parent
    /// coordinate when `inherit` is set and the node does not declare it.
    ///
    /// The instant is returned as its raw text; typing is left to the caller.
    pub fn eu_aspect_value(&self, id: DefinitionId, aspect: &Aspect, inherit: bool) -> Option<Value> {
        let node = self.arena.get(id)?;
        let NodeKind::EuAxisCoord(coord) = &node.kind else {
            return None;
        };
        let parent_coord = node
            .parent
            .filter(|p| matches!(self.arena.get(*p).map(|n| &n.kind), Some(NodeKind::EuAxisCoord(_))));
        if *aspect == Aspect::Dimensions {
            let mut dims = node.dimensions_covered(None);
            if inherit {
                if let Some(Value::Dimensions(inherited)) =
                    parent_coord.and_then(|p| self.eu_aspect_value(p, aspect, inherit))
                {
                    dims.extend(inherited);
                }
            }
            return Some(Value::Dimensions(dims));
        }
        if inherit && !node.has_aspect(aspect, None) {
            return parent_coord.and_then(|p| self.eu_aspect_value(p, aspect, inherit));
        }
        match aspect {
            Aspect::Concept => coord.primary_item.clone().map(Value::QName),
            Aspect::PeriodType => coord.time_reference.as_ref().map(|_| Value::text("instant")),
            Aspect::Instant => coord.time_reference.clone().map(Value::Text),
            Aspect::Dimension(q) => coord
                .dim_coords
                .iter()
                .find(|(d, _)| d == q)
                .map(|(_, member)| Value::QName(member.clone())),
            _ => None,
        }
    }
}
