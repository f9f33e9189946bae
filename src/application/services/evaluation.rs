//! Scoped expression evaluation
//!
//! An evaluation assembles its variable scope by walking from the requesting
//! structural node towards the root. Past the root it continues into the
//! other ordinate (if one was given) and from there into z-inheritance, so
//! page axes contribute context to every cell. Bindings made by a level are
//! removed again when the call returns, on success and on failure alike.

use std::collections::HashSet;

use tracing::{debug, error, instrument};

use crate::application::services::RenderPass;
use crate::application::{EvalResultExt, EvaluationFailure, Recovery};
use crate::domain::{
    AxisSpec, DefinitionId, EvalContext, EvalError, Expression, FactId, NodeId, Param, QName, Value,
};

/// What to evaluate: an expression, the definition node it belongs to and
/// the role it is reported under when it fails.
#[derive(Debug, Clone, Copy)]
pub struct EvalRequest<'e> {
    pub expression: &'e Expression,
    pub owner: DefinitionId,
    pub role: &'e str,
    pub args: &'e [Value],
}

impl<'e> EvalRequest<'e> {
    pub fn new(expression: &'e Expression, owner: DefinitionId, role: &'e str) -> Self {
        Self {
            expression,
            owner,
            role,
            args: &[],
        }
    }

    pub fn with_args(mut self, args: &'e [Value]) -> Self {
        self.args = args;
        self
    }
}

impl<'a> RenderPass<'a> {
    /// Nodes whose bindings are visible from `node`, innermost first.
    ///
    /// Parents come first; at a root the walk moves to `other_ordinate`
    /// (once), else to the root's z-inheritance node.
    pub fn scope_chain(&self, node: NodeId, other_ordinate: Option<NodeId>) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut other = other_ordinate;
        let mut current = Some(node);
        while let Some(idx) = current {
            if !seen.insert(idx) {
                break;
            }
            let Some(n) = self.tree.get_node(idx) else {
                break;
            };
            chain.push(idx);
            current = match n.parent {
                Some(parent) => Some(parent),
                None => other.take().or(n.z_inheritance),
            };
        }
        chain
    }

    fn owner_name(&self, owner: DefinitionId) -> String {
        self.model
            .get(owner)
            .map(|n| n.id.clone())
            .unwrap_or_else(|| format!("{:?}", owner))
    }

    /// Evaluate `request` in the scope of `node`.
    ///
    /// Variable precedence is innermost first: a name bound closer to the
    /// leaf hides the same name further out, and a name already bound in
    /// `ctx` hides them all. While the call runs, the context item is the
    /// nearest fact bound along the chain unless it already is a fact.
    #[instrument(level = "trace", skip(self, ctx, request), fields(role = request.role))]
    pub fn evaluate(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        other_ordinate: Option<NodeId>,
        request: EvalRequest<'_>,
    ) -> Result<Value, EvaluationFailure> {
        let chain = self.scope_chain(node, other_ordinate);

        let mut owned: Vec<String> = Vec::new();
        let mut bound_fact: Option<FactId> = None;
        for &level in &chain {
            let Some(n) = self.tree.get_node(level) else {
                continue;
            };
            if bound_fact.is_none() {
                bound_fact = n.context_fact.clone();
            }
            let active = self.tree.active(level);
            let table = self.tree.table_of(level).or_else(|| {
                self.tree
                    .get_node(active)
                    .and_then(|a| self.model.table_of(a.definition))
            });
            if let Some(table) = table {
                for (name, value) in self.model.parameters(table) {
                    if ctx.bind(name, value.clone()) {
                        owned.push(name.clone());
                    }
                }
            }
            if let Some(a) = self.tree.get_node(active) {
                for (name, value) in &a.variables {
                    if ctx.bind(name, value.clone()) {
                        owned.push(name.clone());
                    }
                }
            }
        }

        let previous_item = match bound_fact {
            Some(fact) if !ctx.context_item_is_fact() => Some(ctx.replace_context_item(Some(Value::Fact(fact)))),
            _ => None,
        };

        let owner = self.owner_name(request.owner);
        let result = request
            .expression
            .program(self.services.engine.as_ref(), &owner, request.role)
            .map_err(EvalError::from)
            .and_then(|program| self.services.engine.evaluate(&program, ctx, request.args));

        for name in &owned {
            ctx.unbind(name);
        }
        if let Some(previous) = previous_item {
            ctx.replace_context_item(previous);
        }

        result.map_err(|source| {
            if self.options.log_failures {
                error!(node = %owner, role = request.role, "expression evaluation failed: {}", source);
            }
            EvaluationFailure {
                node: owner,
                role: request.role.to_string(),
                source,
            }
        })
    }

    /// Evaluate a relationship parameter: a literal is returned as is, an
    /// expression is evaluated for `node` and converted; failures and
    /// unconvertible results are absent.
    pub(crate) fn param_value<T: Clone>(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        owner: DefinitionId,
        param: &Param<T>,
        role: &str,
        convert: impl Fn(Value) -> Option<T>,
    ) -> Option<T> {
        match param {
            Param::Absent => None,
            Param::Literal(v) => Some(v.clone()),
            Param::Expression(expr) => {
                let value = self
                    .evaluate(ctx, node, None, EvalRequest::new(expr, owner, role))
                    .recover(Recovery::Absent)
                    .and_then(Value::flatten)?;
                let converted = convert(value);
                if converted.is_none() {
                    debug!("{} on {:?} did not yield a usable value", role, owner);
                }
                converted
            }
        }
    }

    /// Whether this node or, failing that, `other_ordinate` carries a value
    /// expression.
    pub fn has_value_expression(&self, node: NodeId, other_ordinate: Option<NodeId>) -> bool {
        self.value_expression_owner(node, other_ordinate).is_some()
    }

    fn value_expression_owner(&self, node: NodeId, other_ordinate: Option<NodeId>) -> Option<(NodeId, DefinitionId)> {
        [Some(node), other_ordinate].into_iter().flatten().find_map(|n| {
            let active = self.tree.get_node(self.tree.active(n))?;
            let def = self.model.get(active.definition)?;
            def.has_value_expression().then_some((n, active.definition))
        })
    }

    /// Evaluate the cell value expression against `fact`, checking this
    /// ordinate first and then the other one. Failures recover to text.
    pub fn eval_value_expression(
        &self,
        ctx: &mut EvalContext,
        node: NodeId,
        other_ordinate: Option<NodeId>,
        fact: &FactId,
    ) -> Option<Value> {
        let (owner_node, owner) = self.value_expression_owner(node, other_ordinate)?;
        let expr = self.model.get(owner)?.value_expression.as_ref()?;
        let other = if owner_node == node { other_ordinate } else { Some(node) };
        let previous = ctx.replace_context_item(Some(Value::Fact(fact.clone())));
        let value = self
            .evaluate(ctx, owner_node, other, EvalRequest::new(expr, owner, "value"))
            .recover(Recovery::Text);
        ctx.replace_context_item(previous);
        value
    }
}

pub(crate) fn to_qname(value: Value) -> Option<QName> {
    match value {
        Value::QName(q) => Some(q),
        other => other.as_qname().cloned().or_else(|| QName::parse(&other.to_string()).ok()),
    }
}

pub(crate) fn to_text(value: Value) -> Option<String> {
    Some(value.to_string()).filter(|s| !s.is_empty())
}

pub(crate) fn to_axis(value: Value) -> Option<AxisSpec> {
    value.to_string().parse().ok()
}

pub(crate) fn to_generations(value: Value) -> Option<u32> {
    match value {
        Value::Integer(i) => u32::try_from(i).ok(),
        other => other.to_string().trim().parse().ok(),
    }
}
