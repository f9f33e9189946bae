//! Aspect cascade
//!
//! Ordinary aspects resolve by override: the node's local value, else the
//! value its definition supplies, else (when inheriting) the parent's.
//! DIMENSIONS accumulates by union down the tree instead, and the querying
//! node's OMIT-DIMENSIONS is subtracted from the result.
//!
//! A choice node answers every query through its selected alternative.

use std::collections::BTreeSet;

use chrono::Duration;
use tracing::{error, instrument, trace};

use crate::application::services::{EvalRequest, RenderPass};
use crate::application::{EvalResultExt, Recovery};
use crate::domain::{
    Aspect, DefinitionNode, DomainError, EvalContext, NodeId, NodeKind, QName, RuleSource, TagSelectors, Value,
};

impl<'a> RenderPass<'a> {
    /// Whether `aspect` is set locally, declared by the node's definition,
    /// or (with `inherit`) available from an ancestor.
    pub fn has_aspect(&self, node: NodeId, aspect: &Aspect, inherit: bool) -> Result<bool, DomainError> {
        let active = self.tree.node(self.tree.active(node))?;
        if active.has_local_aspect(aspect) {
            return Ok(true);
        }
        let def = self.model.node(active.definition)?;
        let covered_dimension = active.resolved().and_then(|r| r.covered_dimension.as_ref());
        if def.has_aspect(aspect, covered_dimension) {
            return Ok(true);
        }
        match self.tree.node(node)?.parent {
            Some(parent) if inherit => self.has_aspect(parent, aspect, inherit),
            _ => Ok(false),
        }
    }

    /// Resolved value of `aspect` at `node`, inheriting from ancestors.
    pub fn aspect_value(&self, ctx: &mut EvalContext, node: NodeId, aspect: &Aspect) -> Result<Option<Value>, DomainError> {
        self.aspect_value_with(ctx, node, aspect, true, None)
    }

    /// Resolved value of `aspect` at `node`.
    ///
    /// `selectors` picks tagged constraint sets; when absent, the node's own
    /// accumulated selectors are used. Ancestors are queried with the same
    /// selectors as the requester.
    #[instrument(level = "trace", skip(self, ctx, selectors))]
    pub fn aspect_value_with(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        aspect: &Aspect,
        inherit: bool,
        selectors: Option<&TagSelectors>,
    ) -> Result<Option<Value>, DomainError> {
        let owner = self.tree.node(node)?;
        let active_id = self.tree.active(node);
        let active = self.tree.node(active_id)?;
        let def = self.model.node(active.definition)?;
        let selectors = match selectors {
            Some(s) => s.clone(),
            None => self.tree.tag_selectors(active_id, self.model)?,
        };

        if *aspect == Aspect::Dimensions {
            return self.dimensions_value(ctx, node, inherit, &selectors);
        }

        if let Some(value) = active.local_aspect(aspect) {
            return Ok(Some(value.clone()));
        }

        let covered_dimension = self.covered_dimension_cached(active_id);
        if def.has_aspect(aspect, covered_dimension.as_ref()) {
            match self.definition_value(ctx, node, def, aspect, &selectors, inherit)? {
                Some(value) => return Ok(Some(value)),
                // A rule whose active set does not declare the aspect
                // falls through to the parent.
                None if matches!(def.kind, NodeKind::Rule { .. }) => {}
                None => return Ok(None),
            }
        }

        match owner.parent {
            Some(parent) if inherit => self.aspect_value_with(ctx, parent, aspect, inherit, Some(&selectors)),
            _ => Ok(None),
        }
    }

    /// Value supplied by the definition of `node`'s active alternative.
    fn definition_value(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        def: &DefinitionNode,
        aspect: &Aspect,
        selectors: &TagSelectors,
        inherit: bool,
    ) -> Result<Option<Value>, DomainError> {
        let active_id = self.tree.active(node);
        let active = self.tree.node(active_id)?;
        let context_fact = self.tree.node(node)?.context_fact.as_ref();
        let value = match &def.kind {
            NodeKind::Rule { sets } => {
                let Some(set) = sets.resolve(selectors) else {
                    return Ok(None);
                };
                if *aspect == Aspect::OmitDimensions {
                    let omitted = set.omitted_dimensions();
                    return Ok((!omitted.is_empty()).then(|| Value::Dimensions(omitted.clone())));
                }
                if *aspect == Aspect::Location {
                    if let Some(var) = set.location_source() {
                        return Ok(ctx.variable(var).cloned());
                    }
                }
                match set.rule(aspect) {
                    None => None,
                    Some(RuleSource::Value(v)) => Some(v.clone()),
                    Some(RuleSource::Expression(expr)) => {
                        let role = aspect.to_string();
                        let request = EvalRequest::new(expr, active.definition, &role);
                        self.evaluate(ctx, node, None, request)
                            .recover(Recovery::Text)
                            .and_then(Value::flatten)
                    }
                }
            }
            NodeKind::Tuple { .. } => context_fact.map(|f| Value::Fact(f.clone())),
            NodeKind::Selection(s) => active.variables.get(&s.variable).cloned(),
            NodeKind::Filter(_) | NodeKind::Aspect(_) => context_fact
                .and_then(|id| self.facts.get(id))
                .and_then(|fact| fact.aspect_value(aspect)),
            NodeKind::EuAxisCoord(_) => self.model.eu_aspect_value(active.definition, aspect, inherit),
            _ => None,
        };
        Ok(value.and_then(|v| self.typed_period(aspect, v, &def.id)))
    }

    /// DIMENSIONS: the parent's set, plus this node's own, minus this
    /// node's OMIT-DIMENSIONS.
    fn dimensions_value(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        inherit: bool,
        selectors: &TagSelectors,
    ) -> Result<Option<Value>, DomainError> {
        let owner = self.tree.node(node)?;
        let active_id = self.tree.active(node);
        let active = self.tree.node(active_id)?;
        let def = self.model.node(active.definition)?;

        let mut dims: BTreeSet<QName> = BTreeSet::new();
        if let Some(parent) = owner.parent.filter(|_| inherit) {
            if let Some(Value::Dimensions(inherited)) =
                self.aspect_value_with(ctx, parent, &Aspect::Dimensions, inherit, Some(selectors))?
            {
                dims.extend(inherited);
            }
        }

        let active_set = def.constraint_sets().and_then(|s| s.resolve(selectors));
        if let Some(Value::Dimensions(local)) = active.local_aspect(&Aspect::Dimensions) {
            dims.extend(local.iter().cloned());
        } else if let Some(set) = active_set {
            if set.has_aspect(&Aspect::Dimensions) {
                dims.extend(set.declared_dimensions());
            }
        } else {
            let covered_dimension = self.covered_dimension_cached(active_id);
            dims.extend(def.dimensions_covered(covered_dimension.as_ref()));
        }
        dims.extend(active.aspects.iter().filter_map(|(a, _)| a.dimension().cloned()));

        // Same precedence as the OMIT-DIMENSIONS aspect itself: local override first.
        match (active.local_aspect(&Aspect::OmitDimensions), active_set) {
            (Some(Value::Dimensions(omitted)), _) => {
                for omitted in omitted {
                    dims.remove(omitted);
                }
            }
            (_, Some(set)) => {
                for omitted in set.omitted_dimensions() {
                    dims.remove(omitted);
                }
            }
            _ => {}
        }
        trace!("dimensions at {:?}: {}", node, dims.len());
        Ok((!dims.is_empty()).then_some(Value::Dimensions(dims)))
    }

    /// Aspects `node` declares, in declaration order, followed by local
    /// overrides the definition does not declare.
    pub fn aspects_covered(&self, node: NodeId) -> Result<Vec<Aspect>, DomainError> {
        let active_id = self.tree.active(node);
        let active = self.tree.node(active_id)?;
        let def = self.model.node(active.definition)?;
        let covered_dimension = self.covered_dimension_cached(active_id);
        let mut covered = def.aspects_covered(covered_dimension.as_ref());
        for (aspect, _) in &active.aspects {
            if !covered.contains(aspect) {
                covered.push(aspect.clone());
            }
        }
        Ok(covered)
    }

    /// Every aspect visible at `node` with its resolved value, own aspects
    /// first, then inherited ones in ancestor order.
    pub fn resolved_aspects(&self, ctx: &mut EvalContext, node: NodeId) -> Result<Vec<(Aspect, Value)>, DomainError> {
        let mut aspects: Vec<Aspect> = Vec::new();
        let mut current = Some(node);
        while let Some(idx) = current {
            for aspect in self.aspects_covered(idx)? {
                if !aspects.contains(&aspect) {
                    aspects.push(aspect);
                }
            }
            current = self.tree.node(idx)?.parent;
        }
        let mut resolved = Vec::new();
        for aspect in aspects {
            if let Some(value) = self.aspect_value(ctx, node, &aspect)? {
                resolved.push((aspect, value));
            }
        }
        Ok(resolved)
    }

    fn covered_dimension_cached(&self, node: NodeId) -> Option<QName> {
        self.tree
            .get_node(node)
            .and_then(|n| n.resolved())
            .and_then(|r| r.covered_dimension.clone())
    }

    /// Type raw period text. Date-only end instants denote the end of that
    /// day, so they move to midnight of the next day. Invalid text is logged
    /// and resolves to absent.
    fn typed_period(&self, aspect: &Aspect, value: Value, owner: &str) -> Option<Value> {
        let Value::Text(text) = &value else {
            return Some(value);
        };
        if !matches!(aspect, Aspect::Instant | Aspect::Start | Aspect::End | Aspect::InstantEnd) {
            return Some(value);
        }
        let is_date_only = !text.contains('T');
        let type_name = if is_date_only { "xs:date" } else { "xs:dateTime" };
        let validated = self.services.validator.validate(type_name, text);
        if !validated.is_valid() {
            error!(node = owner, aspect = %aspect, "invalid period value `{}`", validated.source);
            return None;
        }
        match validated.value {
            Some(Value::DateTime(dt)) if is_date_only && *aspect != Aspect::Start => {
                Some(Value::DateTime(dt + Duration::days(1)))
            }
            other => other,
        }
    }
}
