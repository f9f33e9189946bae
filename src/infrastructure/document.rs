//! TOML document loader
//!
//! Reads a table document (tables, breakdowns, nested definition nodes,
//! graph edges, concepts, labels, messages and facts) into a
//! [`DefinitionModel`], the in-memory collaborators and a [`FactSet`].
//!
//! ```toml
//! [[tables]]
//! id = "t1"
//!
//! [[tables.breakdowns]]
//! id = "t1.x"
//! ordinate = "x"
//!
//! [[tables.breakdowns.nodes]]
//! id = "assets"
//! kind = "concept-relationship"
//! source = "ex:Assets"
//! axis = "descendant-or-self"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::relationship::ARCROLE_PARENT_CHILD;
use crate::domain::{
    Aspect, AspectNode, AxisSpec, ConceptRelationshipNode, ConstraintSet, ConstraintSets, DefinitionId,
    DefinitionModel, DefinitionNode, DimensionMember, DimensionRelationshipNode, DomainError, Edge, EuAxisCoord,
    Expression, Fact, FactSet, FilterNode, FilterSpec, NodeKind, Ordinate, Param, ParentChildOrder, QName,
    RelationshipSpec, SelectionNode, StructuredValue, TableNode, Value,
};
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::infrastructure::memory::{MemoryGraph, MemoryLabels};
use crate::infrastructure::traits::{ConceptInfo, FileSystem, Message, MessageKind};

// ============================================================
// RAW DOCUMENT
// ============================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawDocument {
    tables: Vec<RawTable>,
    concepts: Vec<RawConcept>,
    edges: Vec<RawEdge>,
    labels: Vec<RawLabel>,
    messages: Vec<RawMessage>,
    facts: Vec<RawFact>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    id: String,
    /// Legacy (2010) table: breakdowns hold axis coordinates.
    #[serde(default)]
    eu: bool,
    #[serde(default)]
    filters: Vec<FilterSpec>,
    #[serde(default)]
    parameters: BTreeMap<String, toml::Value>,
    #[serde(default)]
    breakdowns: Vec<RawBreakdown>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBreakdown {
    id: String,
    ordinate: Ordinate,
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RawKind {
    Rule,
    Tuple,
    Composition,
    ConceptRelationship,
    DimensionRelationship,
    Selection,
    Filter,
    Aspect,
    AxisCoord,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    id: String,
    kind: RawKind,
    #[serde(default, rename = "abstract")]
    abstract_flag: bool,
    #[serde(default)]
    roll_up: bool,
    #[serde(default)]
    merge: bool,
    tag_selector: Option<String>,
    parent_child_order: Option<ParentChildOrder>,
    value_expression: Option<String>,

    // rule / tuple
    #[serde(default)]
    rules: Vec<RawRuleSet>,

    // relationship nodes
    source: Option<String>,
    source_expression: Option<String>,
    link_role: Option<String>,
    link_role_expression: Option<String>,
    axis: Option<String>,
    axis_expression: Option<String>,
    generations: Option<u32>,
    generations_expression: Option<String>,
    arcrole: Option<String>,
    arcrole_expression: Option<String>,
    link_name: Option<String>,
    arc_name: Option<String>,
    dimension: Option<String>,
    dimension_expression: Option<String>,

    // selection
    select: Option<String>,
    covered_aspect: Option<String>,
    variable: Option<String>,

    // filter / aspect
    #[serde(default)]
    filters: Vec<FilterSpec>,
    aspect: Option<Aspect>,
    #[serde(default)]
    include_unreported: bool,

    // legacy axis coordinate
    primary_item: Option<String>,
    time_reference: Option<String>,
    #[serde(default)]
    dim_coords: BTreeMap<String, String>,

    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawRuleSet {
    tag: Option<String>,
    /// aspect -> literal value
    values: BTreeMap<String, String>,
    /// aspect -> expression
    expressions: BTreeMap<String, String>,
    omit: Vec<String>,
    location_source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    name: String,
    #[serde(flatten)]
    info: ConceptInfo,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEdge {
    from: String,
    to: String,
    #[serde(default = "default_arcrole")]
    arcrole: String,
    link_role: String,
    target_role: Option<String>,
    link_name: Option<String>,
    arc_name: Option<String>,
    #[serde(default)]
    order: f64,
}

fn default_arcrole() -> String {
    ARCROLE_PARENT_CHILD.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLabel {
    definition: Option<String>,
    concept: Option<String>,
    role: Option<String>,
    lang: Option<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMessage {
    definition: String,
    #[serde(default = "default_message_kind")]
    kind: MessageKind,
    lang: Option<String>,
    text: String,
    expression: Option<String>,
}

fn default_message_kind() -> MessageKind {
    MessageKind::Message
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFact {
    id: String,
    concept: String,
    #[serde(default)]
    tuple: bool,
    #[serde(default)]
    aspects: BTreeMap<String, String>,
    #[serde(default)]
    dimensions: BTreeMap<String, String>,
    #[serde(default)]
    typed_dimensions: BTreeMap<String, String>,
}

// ============================================================
// LOADED DOCUMENT
// ============================================================

/// Everything a render pass needs from one document.
#[derive(Debug, Default)]
pub struct Document {
    pub model: DefinitionModel,
    pub graph: MemoryGraph,
    pub labels: MemoryLabels,
    pub facts: FactSet,
}

/// Loads table documents through the [`FileSystem`] abstraction.
pub struct DocumentLoader {
    fs: Arc<dyn FileSystem>,
}

impl DocumentLoader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn load(&self, path: &Path) -> InfraResult<Document> {
        if !self.fs.exists(path) {
            return Err(InfraError::document(path, "file not found"));
        }
        let text = self
            .fs
            .read_to_string(path)
            .map_err(|e| InfraError::io(format!("read {}", path.display()), e))?;
        Self::parse(&text).map_err(|e| match e {
            InfraError::Document { message, .. } => InfraError::document(path, message),
            InfraError::Application(app) => InfraError::document(path, app.to_string()),
            other => other,
        })
    }

    /// Parse document text; errors carry an empty path.
    pub fn parse(text: &str) -> InfraResult<Document> {
        let raw: RawDocument = toml::from_str(text).map_err(|e| InfraError::document(Path::new(""), e.to_string()))?;
        let mut doc = Document::default();

        for concept in &raw.concepts {
            doc.graph.add_concept(QName::parse(&concept.name)?, concept.info);
        }
        for edge in &raw.edges {
            doc.graph.add_edge(convert_edge(edge)?);
        }
        for table in &raw.tables {
            load_table(&mut doc.model, table)?;
        }
        for label in &raw.labels {
            match (&label.definition, &label.concept) {
                (Some(def), None) => {
                    doc.labels
                        .add_gen_label(def, label.role.as_deref(), label.lang.as_deref(), &label.text)
                }
                (None, Some(concept)) => doc.labels.add_concept_label(
                    &QName::parse(concept)?,
                    label.role.as_deref(),
                    label.lang.as_deref(),
                    &label.text,
                ),
                _ => {
                    return Err(InfraError::document(
                        Path::new(""),
                        format!("label `{}` needs exactly one of definition or concept", label.text),
                    ))
                }
            }
        }
        for message in &raw.messages {
            if doc.model.find(&message.definition).is_none() {
                return Err(DomainError::UnknownDefinition(message.definition.clone()).into());
            }
            doc.labels.add_message(
                &message.definition,
                message.kind,
                message.lang.as_deref(),
                Message {
                    text: message.text.clone(),
                    expression: message.expression.as_deref().map(Expression::new),
                },
            );
        }
        let facts = raw.facts.iter().map(convert_fact).collect::<Result<Vec<_>, _>>()?;
        doc.facts = FactSet::new(facts);

        debug!(
            "loaded document: {} definition nodes, {} edges, {} facts",
            doc.model.len(),
            doc.graph.edges().len(),
            doc.facts.len()
        );
        Ok(doc)
    }
}

// ============================================================
// CONVERSION
// ============================================================

fn load_table(model: &mut DefinitionModel, table: &RawTable) -> Result<(), DomainError> {
    let kind = if table.eu {
        NodeKind::EuTable
    } else {
        NodeKind::Table(TableNode {
            parameters: table
                .parameters
                .iter()
                .map(|(name, value)| (name.clone(), toml_value(value)))
                .collect(),
            filters: table.filters.clone(),
            ..TableNode::default()
        })
    };
    let table_id = model.insert(DefinitionNode::new(&table.id, kind), None)?;
    for breakdown in &table.breakdowns {
        let node = DefinitionNode::new(
            &breakdown.id,
            NodeKind::Breakdown {
                ordinate: breakdown.ordinate,
            },
        );
        let breakdown_id = model.insert(node, Some(table_id))?;
        for raw in &breakdown.nodes {
            load_node(model, raw, breakdown_id)?;
        }
    }
    Ok(())
}

fn load_node(model: &mut DefinitionModel, raw: &RawNode, parent: DefinitionId) -> Result<DefinitionId, DomainError> {
    let mut node = DefinitionNode::new(&raw.id, node_kind(raw)?)
        .with_abstract(raw.abstract_flag)
        .with_roll_up(raw.roll_up)
        .with_merge(raw.merge);
    if let Some(tag) = &raw.tag_selector {
        node = node.with_tag_selector(tag);
    }
    if let Some(order) = raw.parent_child_order {
        node = node.with_parent_child_order(order);
    }
    if let Some(expr) = &raw.value_expression {
        node = node.with_value_expression(expr);
    }
    let id = model.insert(node, Some(parent))?;
    for child in &raw.children {
        load_node(model, child, id)?;
    }
    Ok(id)
}

fn invalid(raw: &RawNode, message: &str) -> DomainError {
    DomainError::InvalidDefinition {
        node: raw.id.clone(),
        message: message.to_string(),
    }
}

/// A literal wins over an expression; neither is `Absent`.
fn param<T>(
    literal: Option<&String>,
    expression: Option<&String>,
    convert: impl Fn(&str) -> Result<T, DomainError>,
) -> Result<Param<T>, DomainError> {
    match (literal, expression) {
        (Some(text), _) => Ok(Param::Literal(convert(text)?)),
        (None, Some(expr)) => Ok(Param::Expression(Expression::new(expr))),
        (None, None) => Ok(Param::Absent),
    }
}

fn relationship_spec(raw: &RawNode) -> Result<RelationshipSpec, DomainError> {
    Ok(RelationshipSpec {
        source: param(raw.source.as_ref(), raw.source_expression.as_ref(), QName::parse)?,
        link_role: param(raw.link_role.as_ref(), raw.link_role_expression.as_ref(), |s| Ok(s.to_string()))?,
        axis: param(raw.axis.as_ref(), raw.axis_expression.as_ref(), |s| s.parse::<AxisSpec>())?,
        generations: match (raw.generations, &raw.generations_expression) {
            (Some(g), _) => Param::Literal(g),
            (None, Some(expr)) => Param::Expression(Expression::new(expr)),
            (None, None) => Param::Absent,
        },
    })
}

fn node_kind(raw: &RawNode) -> Result<NodeKind, DomainError> {
    Ok(match raw.kind {
        RawKind::Rule => NodeKind::Rule {
            sets: constraint_sets(&raw.rules)?,
        },
        RawKind::Tuple => NodeKind::Tuple {
            sets: constraint_sets(&raw.rules)?,
        },
        RawKind::Composition => NodeKind::Composition,
        RawKind::ConceptRelationship => NodeKind::ConceptRelationship(ConceptRelationshipNode {
            rel: relationship_spec(raw)?,
            arcrole: param(raw.arcrole.as_ref(), raw.arcrole_expression.as_ref(), |s| Ok(s.to_string()))?,
            link_name: param(raw.link_name.as_ref(), None, QName::parse)?,
            arc_name: param(raw.arc_name.as_ref(), None, QName::parse)?,
        }),
        RawKind::DimensionRelationship => NodeKind::DimensionRelationship(DimensionRelationshipNode {
            rel: relationship_spec(raw)?,
            dimension: param(raw.dimension.as_ref(), raw.dimension_expression.as_ref(), QName::parse)?,
        }),
        RawKind::Selection => NodeKind::Selection(SelectionNode {
            select: Expression::new(raw.select.as_deref().ok_or_else(|| invalid(raw, "missing select"))?),
            covered: Aspect::from_covered_token(
                raw.covered_aspect
                    .as_deref()
                    .ok_or_else(|| invalid(raw, "missing covered_aspect"))?,
            )?,
            variable: raw.variable.clone().ok_or_else(|| invalid(raw, "missing variable"))?,
        }),
        RawKind::Filter => NodeKind::Filter(FilterNode {
            filters: raw.filters.clone(),
        }),
        RawKind::Aspect => NodeKind::Aspect(AspectNode {
            aspect: raw.aspect.clone().ok_or_else(|| invalid(raw, "missing aspect"))?,
            include_unreported: raw.include_unreported,
            filters: raw.filters.clone(),
        }),
        RawKind::AxisCoord => NodeKind::EuAxisCoord(EuAxisCoord {
            primary_item: raw.primary_item.as_deref().map(QName::parse).transpose()?,
            time_reference: raw.time_reference.clone(),
            dim_coords: raw
                .dim_coords
                .iter()
                .map(|(d, m)| Ok((QName::parse(d)?, QName::parse(m)?)))
                .collect::<Result<Vec<_>, DomainError>>()?,
        }),
    })
}

fn constraint_sets(raw: &[RawRuleSet]) -> Result<ConstraintSets, DomainError> {
    let mut sets = ConstraintSets::new();
    for raw_set in raw {
        let mut set = ConstraintSet::new(raw_set.tag.as_deref());
        for (aspect, text) in &raw_set.values {
            let aspect: Aspect = aspect.parse()?;
            let value = literal_value(&aspect, text)?;
            set = set.with_value(aspect, value);
        }
        for (aspect, expr) in &raw_set.expressions {
            set = set.with_expression(aspect.parse()?, expr);
        }
        for dimension in &raw_set.omit {
            set = set.with_omitted(QName::parse(dimension)?);
        }
        if let Some(variable) = &raw_set.location_source {
            set = set.with_location_source(variable);
        }
        sets = sets.with_set(set);
    }
    Ok(sets)
}

/// Literal rule values: names for concept and dimension aspects,
/// structured objects for entity and period, text otherwise.
fn literal_value(aspect: &Aspect, text: &str) -> Result<Value, DomainError> {
    Ok(match aspect {
        Aspect::Concept => Value::QName(QName::parse(text)?),
        Aspect::Dimension(_) => Value::Member(DimensionMember::Explicit(QName::parse(text)?)),
        Aspect::EntityIdentifier | Aspect::Period => structured(text),
        _ => Value::text(text),
    })
}

fn structured(text: &str) -> Value {
    match text.trim() {
        "forever" => Value::Structured(StructuredValue {
            text: String::new(),
            forever: true,
        }),
        other => Value::Structured(StructuredValue {
            text: other.to_string(),
            forever: false,
        }),
    }
}

fn toml_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::text(s.as_str()),
        toml::Value::Integer(i) => Value::Integer(*i),
        toml::Value::Float(f) => Value::Decimal(*f),
        toml::Value::Boolean(b) => Value::Boolean(*b),
        toml::Value::Array(items) => Value::Sequence(items.iter().map(toml_value).collect()),
        other => Value::text(other.to_string()),
    }
}

fn convert_edge(raw: &RawEdge) -> Result<Edge, DomainError> {
    Ok(Edge {
        from: QName::parse(&raw.from)?,
        to: QName::parse(&raw.to)?,
        arcrole: raw.arcrole.clone(),
        link_role: raw.link_role.clone(),
        target_role: raw.target_role.clone(),
        link_name: raw.link_name.as_deref().map(QName::parse).transpose()?,
        arc_name: raw.arc_name.as_deref().map(QName::parse).transpose()?,
        order: raw.order,
    })
}

fn convert_fact(raw: &RawFact) -> Result<Fact, DomainError> {
    let mut fact = Fact::new(&raw.id, QName::parse(&raw.concept)?);
    fact.is_tuple = raw.tuple;
    for (aspect, text) in &raw.aspects {
        let aspect: Aspect = aspect.parse()?;
        let value = literal_value(&aspect, text)?;
        fact = fact.with_aspect(aspect, value);
    }
    for (dimension, member) in &raw.dimensions {
        fact = fact.with_dimension(QName::parse(dimension)?, DimensionMember::Explicit(QName::parse(member)?));
    }
    for (dimension, text) in &raw.typed_dimensions {
        fact = fact.with_dimension(QName::parse(dimension)?, DimensionMember::Typed(text.clone()));
    }
    Ok(fact)
}
