//! Pre-sizing of generated rows and columns

use crate::application::services::{HeaderRequest, RenderPass};
use crate::domain::relationship;
use crate::domain::{DomainError, EvalContext, NodeId, NodeKind};

impl<'a> RenderPass<'a> {
    /// `(count, depth)` of the rows or columns `node` generates.
    ///
    /// Relationship nodes size by their traversal result; rule and tuple
    /// nodes take one slot when they carry rules or a header; axis
    /// coordinates always take one; every other node takes one slot, one
    /// level deep only when it has a header.
    pub fn cardinality_and_depth(&self, ctx: &mut EvalContext, node: NodeId) -> Result<(usize, usize), DomainError> {
        let active = self.tree.node(self.tree.active(node))?;
        let def = self.model.node(active.definition)?;
        let unevaluated = HeaderRequest::default().unevaluated();
        Ok(match &def.kind {
            NodeKind::ConceptRelationship(_) | NodeKind::DimensionRelationship(_) => {
                match self.relationships(ctx, node)? {
                    Some((query, rels)) => relationship::cardinality_and_depth(&rels, query.axis.or_self),
                    None => (0, 0),
                }
            }
            NodeKind::Rule { sets } | NodeKind::Tuple { sets } => {
                if !sets.is_empty() || self.header(ctx, node, unevaluated)?.is_some() {
                    (1, 1)
                } else {
                    (0, 0)
                }
            }
            NodeKind::EuAxisCoord(_) => (1, 1),
            _ => (1, usize::from(self.header(ctx, node, unevaluated)?.is_some())),
        })
    }
}
