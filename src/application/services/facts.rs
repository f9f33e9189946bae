//! Candidate fact selection for structural nodes

use tracing::debug;

use crate::application::services::{EvalRequest, RenderPass};
use crate::application::{EvalResultExt, Recovery};
use crate::domain::{
    order_filters, Aspect, DefinitionId, DomainError, EvalContext, Fact, NodeId, NodeKind, RuleSource, Value,
};

impl<'a> RenderPass<'a> {
    /// Facts passing the table's filters, concept-name filters first.
    pub fn table_facts(&self, table: DefinitionId) -> Vec<&'a Fact> {
        let filters = order_filters(self.model.node(table).map(|n| n.kind.filters().to_vec()).unwrap_or_default());
        let all: Vec<&'a Fact> = self.facts.iter().collect();
        let kept = self.services.filter.apply(all, &filters);
        debug!("table_facts: {} of {} facts", kept.len(), self.facts.len());
        kept
    }

    /// Facts matching the aspect values a closed node resolves to.
    ///
    /// Tuple nodes only accept tuple facts, matched on their rules except
    /// LOCATION. Open nodes pass every fact through.
    pub fn filtered_facts<'f>(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        facts: &[&'f Fact],
    ) -> Result<Vec<&'f Fact>, DomainError> {
        let active_id = self.tree.active(node);
        let active = self.tree.node(active_id)?;
        let def = self.model.node(active.definition)?;
        if !def.kind.is_closed() {
            return Ok(facts.to_vec());
        }

        let mut target: Vec<(Aspect, Value)> = Vec::new();
        let is_tuple = matches!(def.kind, NodeKind::Tuple { .. });
        let aspects: Vec<Aspect> = match &def.kind {
            NodeKind::Tuple { sets } => {
                let selectors = self.tree.tag_selectors(active_id, self.model)?;
                sets.resolve(&selectors)
                    .map(|set| set.rules().iter().map(|r| r.aspect.clone()).collect())
                    .unwrap_or_default()
            }
            _ => self.aspects_covered(node)?,
        };
        for aspect in aspects {
            if matches!(aspect, Aspect::Location | Aspect::OmitDimensions) {
                continue;
            }
            let value = if is_tuple {
                self.tuple_rule_value(ctx, node, &aspect)?
            } else {
                self.aspect_value(ctx, node, &aspect)?
            };
            if let Some(value) = value {
                target.push((aspect, value));
            }
        }

        let filter = self.services.filter.as_ref();
        Ok(facts
            .iter()
            .copied()
            .filter(|f| !is_tuple || f.is_tuple)
            .filter(|f| filter.aspects_match(f, &target))
            .collect())
    }

    /// A tuple node's own rule value; these are never exposed to
    /// descendants, so they bypass the cascade.
    fn tuple_rule_value(&self, ctx: &mut EvalContext, node: NodeId, aspect: &Aspect) -> Result<Option<Value>, DomainError> {
        let active_id = self.tree.active(node);
        let active = self.tree.node(active_id)?;
        let def = self.model.node(active.definition)?;
        let NodeKind::Tuple { sets } = &def.kind else {
            return Ok(None);
        };
        let selectors = self.tree.tag_selectors(active_id, self.model)?;
        let Some(set) = sets.resolve(&selectors) else {
            return Ok(None);
        };
        Ok(match set.rule(aspect) {
            Some(RuleSource::Value(v)) => Some(v.clone()),
            Some(RuleSource::Expression(expr)) => {
                let role = aspect.to_string();
                let request = EvalRequest::new(expr, active.definition, &role);
                self.evaluate(ctx, node, None, request)
                    .recover(Recovery::Absent)
                    .and_then(Value::flatten)
            }
            None => None,
        })
    }

    /// Apply a filter or aspect node's filters and partition the survivors
    /// by the covered aspects' values, in first-seen order.
    ///
    /// Unless unreported values are included, facts lacking an explicit
    /// value for a covered dimension are dropped.
    pub fn filtered_facts_partitions<'f>(&self, node: NodeId, facts: &[&'f Fact]) -> Result<Vec<Vec<&'f Fact>>, DomainError> {
        let active = self.tree.node(self.tree.active(node))?;
        let def = self.model.node(active.definition)?;
        let include_unreported = match &def.kind {
            NodeKind::Aspect(n) => n.include_unreported,
            NodeKind::Filter(_) => false,
            _ => return Ok(vec![facts.to_vec()]),
        };
        let kept = self.services.filter.apply(facts.to_vec(), def.kind.filters());

        let covered: Vec<Aspect> = def
            .aspects_covered(None)
            .into_iter()
            .filter(|a| *a != Aspect::Dimensions)
            .collect();
        let dims: Vec<_> = covered.iter().filter_map(Aspect::dimension).collect();

        let mut partitions: Vec<(Vec<String>, Vec<&'f Fact>)> = Vec::new();
        for fact in kept {
            if !include_unreported && dims.iter().any(|d| fact.dim_value(d).is_none()) {
                continue;
            }
            let key: Vec<String> = covered
                .iter()
                .map(|a| fact.aspect_value(a).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            match partitions.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(fact),
                None => partitions.push((key, vec![fact])),
            }
        }
        debug!("partitions at {:?}: {}", node, partitions.len());
        Ok(partitions.into_iter().map(|(_, group)| group).collect())
    }
}
