//! Relationship traversal for concept- and dimension-relationship nodes

use tracing::{debug, instrument, warn};

use crate::application::services::evaluation::{to_axis, to_generations, to_qname, to_text};
use crate::application::services::RenderPass;
use crate::domain::relationship::{ALL_DIMENSION_ARCROLES, ARCROLE_DOMAIN_MEMBER, ARCROLE_PARENT_CHILD};
use crate::domain::{
    Axis, DomainError, EvalContext, NodeId, NodeKind, Param, QName, RelNode, RelationshipQuery, RelationshipSpec,
};
use crate::infrastructure::traits::RelationshipStore;

/// Walks the relationship graph and produces nested results.
pub struct GraphWalker<'g> {
    graph: &'g dyn RelationshipStore,
    max_generations: u32,
}

impl<'g> GraphWalker<'g> {
    pub fn new(graph: &'g dyn RelationshipStore, max_generations: u32) -> Self {
        Self { graph, max_generations }
    }

    /// Generation budget of a query; 0 means unlimited.
    fn budget(&self, query: &RelationshipQuery) -> u32 {
        if query.generations == 0 {
            self.max_generations
        } else {
            query.generations
        }
    }

    /// Traverse from the query source. The source itself is never part of
    /// the result, `-or-self` is accounted for by the caller.
    #[instrument(level = "debug", skip(self, query), fields(axis = %query.axis))]
    pub fn walk(&self, query: &RelationshipQuery) -> Vec<RelNode> {
        let budget = self.budget(query);
        let mut path = Vec::new();
        let result = match (&query.source, query.axis.axis) {
            (None, Axis::Child | Axis::Descendant) => {
                let mut out = Vec::new();
                for root in self.graph.roots(query) {
                    out.push(RelNode::Item(root.clone()));
                    if budget != 1 {
                        path.push(root.clone());
                        let sub = self.down(query, &root, query.link_role.clone(), next_budget(budget), &mut path);
                        path.pop();
                        if !sub.is_empty() {
                            out.push(RelNode::Nested(sub));
                        }
                    }
                }
                out
            }
            (None, _) => Vec::new(),
            (Some(source), Axis::Child | Axis::Descendant) => {
                path.push(source.clone());
                self.down(query, source, query.link_role.clone(), budget, &mut path)
            }
            (Some(source), Axis::Parent | Axis::Ancestor) => {
                path.push(source.clone());
                self.up(query, source, query.link_role.clone(), budget, &mut path)
            }
            (Some(source), Axis::Sibling) => self.siblings(query, source),
        };
        debug!("walk: {} top-level results", result.len());
        result
    }

    fn down(
        &self,
        query: &RelationshipQuery,
        from: &QName,
        link_role: Option<String>,
        budget: u32,
        path: &mut Vec<QName>,
    ) -> Vec<RelNode> {
        let hop = query.clone().with_link_role(link_role.as_deref());
        let mut out = Vec::new();
        for edge in self.graph.edges_from(from, &hop) {
            if path.contains(&edge.to) {
                warn!("cycle at {} -> {}, skipping", edge.from, edge.to);
                continue;
            }
            out.push(RelNode::Item(edge.to.clone()));
            if budget != 1 {
                let next_role = query.link_role.as_ref().map(|_| edge.consecutive_link_role().to_string());
                path.push(edge.to.clone());
                let sub = self.down(query, &edge.to, next_role, next_budget(budget), path);
                path.pop();
                if !sub.is_empty() {
                    out.push(RelNode::Nested(sub));
                }
            }
        }
        out
    }

    fn up(
        &self,
        query: &RelationshipQuery,
        to: &QName,
        link_role: Option<String>,
        budget: u32,
        path: &mut Vec<QName>,
    ) -> Vec<RelNode> {
        let hop = query.clone().with_link_role(link_role.as_deref());
        let mut out = Vec::new();
        for edge in self.graph.edges_to(to, &query.arcroles) {
            if !hop.matches(&edge) {
                continue;
            }
            if path.contains(&edge.from) {
                warn!("cycle at {} <- {}, skipping", edge.to, edge.from);
                continue;
            }
            out.push(RelNode::Item(edge.from.clone()));
            if budget != 1 {
                let next_role = query.link_role.as_ref().map(|_| edge.link_role.clone());
                path.push(edge.from.clone());
                let sub = self.up(query, &edge.from, next_role, next_budget(budget), path);
                path.pop();
                if !sub.is_empty() {
                    out.push(RelNode::Nested(sub));
                }
            }
        }
        out
    }

    fn siblings(&self, query: &RelationshipQuery, source: &QName) -> Vec<RelNode> {
        let mut out: Vec<RelNode> = Vec::new();
        for parent_edge in self.graph.edges_to(source, &query.arcroles) {
            if !query.matches(&parent_edge) {
                continue;
            }
            let hop = query.clone().with_link_role(Some(&parent_edge.link_role));
            for edge in self.graph.edges_from(&parent_edge.from, &hop) {
                let item = RelNode::Item(edge.to.clone());
                if &edge.to != source && !out.contains(&item) {
                    out.push(item);
                }
            }
        }
        out
    }

    /// The dimension governing `concept`: the concept itself if it is a
    /// dimension, else the first dimension reached walking incoming edges
    /// whose consecutive link role continues the previous hop, in storage
    /// order.
    pub fn governing_dimension(&self, concept: &QName, link_role: Option<&str>, arcroles: &[String]) -> Option<QName> {
        let mut path = Vec::new();
        self.governing_dimension_from(concept, link_role, arcroles, &mut path)
    }

    fn governing_dimension_from(
        &self,
        concept: &QName,
        link_role: Option<&str>,
        arcroles: &[String],
        path: &mut Vec<QName>,
    ) -> Option<QName> {
        if self.graph.concept(concept).is_some_and(|c| c.is_dimension) {
            return Some(concept.clone());
        }
        if path.contains(concept) {
            warn!("cycle at {} while resolving its dimension", concept);
            return None;
        }
        path.push(concept.clone());
        let found = self
            .graph
            .edges_to(concept, arcroles)
            .into_iter()
            .filter(|edge| link_role.map_or(true, |role| role == edge.consecutive_link_role()))
            .find_map(|edge| self.governing_dimension_from(&edge.from, Some(&edge.link_role), arcroles, path));
        path.pop();
        found
    }
}

fn next_budget(budget: u32) -> u32 {
    budget.saturating_sub(1)
}

impl<'a> RenderPass<'a> {
    fn arcroles_for(&self, arcrole: &str) -> Vec<String> {
        if arcrole == ALL_DIMENSION_ARCROLES {
            self.options.dimension_arcroles.clone()
        } else {
            vec![arcrole.to_string()]
        }
    }

    /// Evaluate the traversal parameters of a relationship node.
    pub fn relationship_query(&self, ctx: &mut EvalContext, node: NodeId) -> Result<Option<RelationshipQuery>, DomainError> {
        let active = self.tree.node(self.tree.active(node))?;
        let owner = active.definition;
        let def = self.model.node(owner)?;
        let (rel, arcroles, link_name, arc_name, default_source): (&RelationshipSpec, _, _, _, _) = match &def.kind {
            NodeKind::ConceptRelationship(n) => {
                let arcrole = self
                    .param_value(ctx, node, owner, &n.arcrole, "arcroleExpression", to_text)
                    .unwrap_or_else(|| ARCROLE_PARENT_CHILD.to_string());
                let link_name = self.param_value(ctx, node, owner, &n.link_name, "linknameExpression", to_qname);
                let arc_name = self.param_value(ctx, node, owner, &n.arc_name, "arcnameExpression", to_qname);
                (&n.rel, self.arcroles_for(&arcrole), link_name, arc_name, None)
            }
            NodeKind::DimensionRelationship(n) => {
                let dimension = self.param_value(ctx, node, owner, &n.dimension, "dimensionExpression", to_qname);
                (&n.rel, self.options.dimension_arcroles.clone(), None, None, dimension)
            }
            _ => return Ok(None),
        };

        let source = match &rel.source {
            Param::Absent => default_source,
            param => self.param_value(ctx, node, owner, param, "relationshipSourceExpression", to_qname),
        };
        let link_role = self.param_value(ctx, node, owner, &rel.link_role, "linkroleExpression", to_text);
        let axis = match &rel.axis {
            Param::Absent => Default::default(),
            param => self
                .param_value(ctx, node, owner, param, "axisExpression", to_axis)
                .unwrap_or_else(|| {
                    warn!(node = %def.id, "invalid axis, using descendant");
                    Default::default()
                }),
        };
        let generations = self
            .param_value(ctx, node, owner, &rel.generations, "generationsExpression", to_generations)
            .unwrap_or_else(|| axis.axis.default_generations());

        let mut query = RelationshipQuery::new(source, ARCROLE_DOMAIN_MEMBER)
            .with_arcroles(arcroles)
            .with_link_role(link_role.as_deref())
            .with_axis(axis)
            .with_generations(generations);
        query.link_name = link_name;
        query.arc_name = arc_name;
        Ok(Some(query))
    }

    /// Traversal result of a relationship node, evaluated fresh each call.
    /// Other node kinds have none.
    pub fn relationships(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
    ) -> Result<Option<(RelationshipQuery, Vec<RelNode>)>, DomainError> {
        let Some(query) = self.relationship_query(ctx, node)? else {
            return Ok(None);
        };
        let result = self.walker().walk(&query);
        Ok(Some((query, result)))
    }

    /// The dimension a dimension-relationship node covers.
    ///
    /// A declared dimension must be a dimension concept and a declared source
    /// must be an item; otherwise there is none. Without a declared
    /// dimension, the dimension governing the source is used.
    pub fn resolve_covered_dimension(&self, ctx: &mut EvalContext, node: NodeId) -> Result<Option<QName>, DomainError> {
        let active = self.tree.node(self.tree.active(node))?;
        let owner = active.definition;
        let def = self.model.node(owner)?;
        let NodeKind::DimensionRelationship(n) = &def.kind else {
            return Ok(None);
        };
        let graph = self.services.graph.as_ref();
        let dimension = self.param_value(ctx, node, owner, &n.dimension, "dimensionExpression", to_qname);
        let source = self.param_value(ctx, node, owner, &n.rel.source, "relationshipSourceExpression", to_qname);

        if let Some(dim) = &dimension {
            if !graph.concept(dim).is_some_and(|c| c.is_dimension) {
                debug!("{} is not a dimension", dim);
                return Ok(None);
            }
        }
        if let Some(src) = &source {
            if !graph.concept(src).is_some_and(|c| c.is_item) {
                debug!("{} is not an item", src);
                return Ok(None);
            }
        }
        if dimension.is_some() {
            return Ok(dimension);
        }
        let link_role = self.param_value(ctx, node, owner, &n.rel.link_role, "linkroleExpression", to_text);
        Ok(source.and_then(|src| {
            self.walker()
                .governing_dimension(&src, link_role.as_deref(), &self.options.dimension_arcroles)
        }))
    }

    /// The covered dimension, from the resolved state when available.
    pub fn covered_dimension(&self, ctx: &mut EvalContext, node: NodeId) -> Result<Option<QName>, DomainError> {
        let active = self.tree.node(self.tree.active(node))?;
        match active.resolved() {
            Some(state) => Ok(state.covered_dimension.clone()),
            None => self.resolve_covered_dimension(ctx, node),
        }
    }
}
