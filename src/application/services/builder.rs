//! Structural tree construction for one render pass.

use tracing::{debug, instrument, warn};

use crate::application::services::{EvalRequest, RenderOptions, RenderPass, RenderServices};
use crate::application::{ApplicationError, ApplicationResult, EvalResultExt, Recovery};
use crate::domain::{
    Aspect, DefinitionId, DefinitionModel, DefinitionNode, DimensionMember, DomainError, EvalContext, Fact, FactSet,
    NodeId, NodeKind, Ordinate, ParentChildOrder, QName, RelNode, ResolvedState, RollUp, StructuralTree, TagSelectors,
    Value,
};

/// Axis roots of a built table, by ordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableAxes {
    pub x: Vec<NodeId>,
    pub y: Vec<NodeId>,
    pub z: Vec<NodeId>,
}

impl TableAxes {
    pub fn axis(&self, ordinate: Ordinate) -> &[NodeId] {
        match ordinate {
            Ordinate::X => &self.x,
            Ordinate::Y => &self.y,
            Ordinate::Z => &self.z,
        }
    }

    fn push(&mut self, ordinate: Ordinate, root: NodeId) {
        match ordinate {
            Ordinate::X => self.x.push(root),
            Ordinate::Y => self.y.push(root),
            Ordinate::Z => self.z.push(root),
        }
    }
}

/// Instantiates structural nodes from definition nodes.
///
/// A builder owns one fresh [`StructuralTree`]; build a new one for every
/// render pass.
pub struct StructuralTreeBuilder<'a> {
    model: &'a DefinitionModel,
    facts: &'a FactSet,
    services: &'a RenderServices,
    options: &'a RenderOptions,
    tree: StructuralTree,
    path: Vec<DefinitionId>,
}

impl<'a> StructuralTreeBuilder<'a> {
    pub fn new(
        model: &'a DefinitionModel,
        facts: &'a FactSet,
        services: &'a RenderServices,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            model,
            facts,
            services,
            options,
            tree: StructuralTree::new(),
            path: Vec::new(),
        }
    }

    pub fn tree(&self) -> &StructuralTree {
        &self.tree
    }

    pub fn into_tree(self) -> StructuralTree {
        self.tree
    }

    fn pass(&self) -> RenderPass<'_> {
        RenderPass::new(self.model, &self.tree, self.facts, self.services, self.options)
    }

    /// Build every breakdown of `table`.
    ///
    /// The z axis is built first; x and y roots inherit from its first leaf.
    /// Finishes with the resolved-state pass over all new nodes.
    #[instrument(level = "debug", skip(self))]
    pub fn build_table(&mut self, table: DefinitionId) -> ApplicationResult<TableAxes> {
        let model = self.model;
        let table_node = model.node(table)?;
        if !table_node.kind.is_table() {
            return Err(ApplicationError::TableNotFound(table_node.id.clone()));
        }

        let mut ctx = EvalContext::new();
        let candidates = self.table_candidates(table);
        let breakdowns = model.breakdowns(table);
        let mut axes = TableAxes::default();
        let mut z_leaf: Option<NodeId> = None;

        for ordinate in [Ordinate::Z, Ordinate::X, Ordinate::Y] {
            for &(_, breakdown) in breakdowns.iter().filter(|(o, _)| *o == ordinate) {
                let root = self.tree.insert_root(breakdown, Some(table));
                if let (Some(z), false) = (z_leaf, ordinate == Ordinate::Z) {
                    self.tree.set_z_inheritance(root, z)?;
                }
                self.path.clear();
                self.path.push(breakdown);
                self.build_children(&mut ctx, root, breakdown, &candidates, ordinate == Ordinate::Z)?;
                self.classify(root, model.node(breakdown)?)?;
                axes.push(ordinate, root);
            }
            if ordinate == Ordinate::Z {
                z_leaf = axes.z.first().and_then(|&root| self.tree.leaf_nodes(root).first().copied());
            }
        }

        let roots: Vec<NodeId> = axes.z.iter().chain(&axes.x).chain(&axes.y).copied().collect();
        for root in roots {
            self.resolve_state(&mut ctx, root, None)?;
        }
        debug!(
            "build_table: {} nodes, x={} y={} z={}",
            self.tree.len(),
            axes.x.len(),
            axes.y.len(),
            axes.z.len()
        );
        Ok(axes)
    }

    fn table_candidates(&self, table: DefinitionId) -> Vec<&'a Fact> {
        let all: &'a FactSet = self.facts;
        let kept: Vec<_> = self.pass().table_facts(table).iter().map(|f| f.id.clone()).collect();
        kept.iter().filter_map(|id| all.get(id)).collect()
    }

    /// Instantiate the definition children of `definition` below `parent`.
    /// On the z axis, two or more children become choice alternatives of a
    /// single node.
    fn build_children(
        &mut self,
        ctx: &mut EvalContext,
        parent: NodeId,
        definition: DefinitionId,
        facts: &[&'a Fact],
        is_z: bool,
    ) -> ApplicationResult<()> {
        let model = self.model;
        let children = &model.node(definition)?.children;
        if is_z && children.len() >= 2 {
            let owner = self.tree.insert_child(parent, children[0])?;
            for &child in children {
                let alternative = self.tree.add_choice(owner, child)?;
                self.expand(ctx, alternative, child, facts, is_z)?;
            }
            return Ok(());
        }
        for &child in children {
            let node = self.tree.insert_child(parent, child)?;
            self.expand(ctx, node, child, facts, is_z)?;
        }
        Ok(())
    }

    fn expand(
        &mut self,
        ctx: &mut EvalContext,
        node: NodeId,
        definition: DefinitionId,
        facts: &[&'a Fact],
        is_z: bool,
    ) -> ApplicationResult<()> {
        let model = self.model;
        let def = model.node(definition)?;
        if self.path.contains(&definition) {
            return Err(DomainError::CycleDetected(def.id.clone()).into());
        }
        self.path.push(definition);

        match &def.kind {
            NodeKind::Selection(selection) => {
                let request = EvalRequest::new(&selection.select, definition, "select");
                let value = self
                    .pass()
                    .evaluate(ctx, node, None, request)
                    .recover(Recovery::Absent)
                    .and_then(Value::flatten);
                if let Some(value) = value {
                    self.tree.bind_variable(node, &selection.variable, value)?;
                }
                self.tree.set_selection_binding(node, true)?;
                self.build_children(ctx, node, definition, facts, is_z)?;
            }
            NodeKind::ConceptRelationship(_) | NodeKind::DimensionRelationship(_) => {
                let expansion = self.pass().relationships(ctx, node)?;
                let covered = self.pass().resolve_covered_dimension(ctx, node)?;
                if let Some((query, rels)) = expansion {
                    match (&query.source, query.axis.or_self) {
                        (Some(source), true) => {
                            let child = self.generated_child(node, def, source, covered.as_ref())?;
                            self.expand_relationships(child, def, &rels, covered.as_ref())?;
                            self.classify(child, def)?;
                        }
                        _ => self.expand_relationships(node, def, &rels, covered.as_ref())?,
                    }
                }
                self.build_children(ctx, node, definition, facts, is_z)?;
            }
            NodeKind::Filter(_) | NodeKind::Aspect(_) => {
                let partitions = self.pass().filtered_facts_partitions(node, facts)?;
                for group in partitions {
                    let Some(first) = group.first() else {
                        continue;
                    };
                    let child = self.tree.insert_child(node, definition)?;
                    self.tree.bind_fact(child, first.id.clone())?;
                    self.build_children(ctx, child, definition, &group, is_z)?;
                    self.classify(child, def)?;
                }
            }
            NodeKind::Tuple { .. } => {
                let matching = self.pass().filtered_facts(ctx, node, facts)?;
                for fact in matching {
                    let child = self.tree.insert_child(node, definition)?;
                    self.tree.bind_fact(child, fact.id.clone())?;
                    self.build_children(ctx, child, definition, facts, is_z)?;
                    self.classify(child, def)?;
                }
            }
            _ => self.build_children(ctx, node, definition, facts, is_z)?,
        }

        self.classify(node, def)?;
        self.path.pop();
        Ok(())
    }

    /// A child standing for one traversal result; its local override
    /// carries the concept (or the dimension member).
    fn generated_child(
        &mut self,
        parent: NodeId,
        def: &DefinitionNode,
        name: &QName,
        covered: Option<&QName>,
    ) -> Result<NodeId, DomainError> {
        let definition = self.tree.node(parent)?.definition;
        let child = self.tree.insert_child(parent, definition)?;
        match (&def.kind, covered) {
            (NodeKind::DimensionRelationship(_), Some(dimension)) => self.tree.set_aspect(
                child,
                Aspect::Dimension(dimension.clone()),
                Value::Member(DimensionMember::Explicit(name.clone())),
            )?,
            (NodeKind::DimensionRelationship(_), None) => {
                warn!(node = %def.id, "no covered dimension for member {}", name);
            }
            _ => self.tree.set_aspect(child, Aspect::Concept, Value::QName(name.clone()))?,
        }
        Ok(child)
    }

    fn expand_relationships(
        &mut self,
        parent: NodeId,
        def: &DefinitionNode,
        rels: &[RelNode],
        covered: Option<&QName>,
    ) -> Result<(), DomainError> {
        let mut last: Option<NodeId> = None;
        for rel in rels {
            match rel {
                RelNode::Item(name) => last = Some(self.generated_child(parent, def, name, covered)?),
                RelNode::Nested(sub) => {
                    if let Some(item) = last {
                        self.expand_relationships(item, def, sub, covered)?;
                        self.classify(item, def)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Roll-up classification once a node's subtree is built.
    fn classify(&mut self, node: NodeId, def: &DefinitionNode) -> Result<(), DomainError> {
        let children = self.tree.node(node)?.children.clone();
        if children.is_empty() {
            return Ok(());
        }
        let roll_up = if def.is_abstract() {
            RollUp::ChildrenNoRollUp
        } else {
            match def.parent_child_order() {
                ParentChildOrder::ParentFirst => RollUp::ChildFirst,
                ParentChildOrder::ChildrenFirst => RollUp::ChildLast,
            }
        };
        self.tree.set_subtree_roll_up(node, roll_up)?;

        let model = self.model;
        let roll_up_child = children.into_iter().find(|&child| {
            self.tree
                .get_node(child)
                .and_then(|c| model.get(c.definition))
                .is_some_and(|d| d.is_roll_up())
        });
        if let Some(child) = roll_up_child {
            self.tree.set_roll_up_child(node, child)?;
        }
        Ok(())
    }

    /// Compute accumulated tag selectors and covered dimensions once per
    /// node. Choice alternatives accumulate from the owner's parent.
    fn resolve_state(
        &mut self,
        ctx: &mut EvalContext,
        node: NodeId,
        parent_selectors: Option<&TagSelectors>,
    ) -> ApplicationResult<()> {
        let model = self.model;
        let (definition, children, choices) = {
            let n = self.tree.node(node)?;
            (n.definition, n.children.clone(), n.choices.clone())
        };
        let def = model.node(definition)?;
        let tag_selectors = TagSelectors::accumulate(parent_selectors, def.tag_selector.as_deref());
        let covered_dimension = match def.kind {
            NodeKind::DimensionRelationship(_) => {
                let n = self.tree.node(node)?;
                // Generated children share the definition; reuse the parent's answer.
                match n.parent.and_then(|p| self.tree.get_node(p)) {
                    Some(p) if p.definition == definition => {
                        p.resolved().and_then(|r| r.covered_dimension.clone())
                    }
                    _ => self.pass().resolve_covered_dimension(ctx, node)?,
                }
            }
            _ => None,
        };
        self.tree.set_resolved(
            node,
            ResolvedState {
                tag_selectors: tag_selectors.clone(),
                covered_dimension,
            },
        )?;
        for choice in choices {
            self.resolve_state(ctx, choice, parent_selectors)?;
        }
        for child in children {
            self.resolve_state(ctx, child, Some(&tag_selectors))?;
        }
        Ok(())
    }
}
