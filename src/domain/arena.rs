use std::collections::BTreeMap;
use std::fmt;

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::aspect::{Aspect, QName};
use crate::domain::constraint::TagSelectors;
use crate::domain::definition::{DefinitionId, DefinitionModel};
use crate::domain::error::DomainError;
use crate::domain::value::{FactId, Value};

pub type NodeId = Index;

/// Roll-up classification of a structural node's subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollUp {
    #[default]
    NotAnalyzed,
    /// Children collapse into a summary placed first.
    ChildFirst,
    /// Children collapse into a summary placed last.
    ChildLast,
    ChildrenNoRollUp,
}

impl fmt::Display for RollUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollUp::NotAnalyzed => write!(f, "not-analyzed"),
            RollUp::ChildFirst => write!(f, "roll-up-first"),
            RollUp::ChildLast => write!(f, "roll-up-last"),
            RollUp::ChildrenNoRollUp => write!(f, "no-roll-up"),
        }
    }
}

/// Values computed once per node in the pass that follows tree construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedState {
    pub tag_selectors: TagSelectors,
    pub covered_dimension: Option<QName>,
}

/// One instantiated position of a render pass, bound to a definition node.
#[derive(Debug)]
pub struct StructuralNode {
    pub definition: DefinitionId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub roll_up_child: Option<NodeId>,
    /// Alternatives; when non-empty the node proxies `choices[choice_index]`.
    pub choices: Vec<NodeId>,
    pub choice_index: usize,
    pub z_inheritance: Option<NodeId>,
    /// Local overrides, in the order they were set.
    pub aspects: Vec<(Aspect, Value)>,
    pub variables: BTreeMap<String, Value>,
    pub context_fact: Option<FactId>,
    pub depth: usize,
    /// Table of the root breakdown; only set on axis roots.
    pub table: Option<DefinitionId>,
    pub abstract_override: Option<bool>,
    pub subtree_roll_up: RollUp,
    /// Set on selection nodes whose value is bound into a variable.
    pub selection_binding: bool,
    resolved: Option<ResolvedState>,
}

impl StructuralNode {
    fn new(definition: DefinitionId, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            definition,
            parent,
            children: Vec::new(),
            roll_up_child: None,
            choices: Vec::new(),
            choice_index: 0,
            z_inheritance: None,
            aspects: Vec::new(),
            variables: BTreeMap::new(),
            context_fact: None,
            depth,
            table: None,
            abstract_override: None,
            subtree_roll_up: RollUp::NotAnalyzed,
            selection_binding: false,
            resolved: None,
        }
    }

    pub fn local_aspect(&self, aspect: &Aspect) -> Option<&Value> {
        self.aspects.iter().find(|(a, _)| a == aspect).map(|(_, v)| v)
    }

    pub fn has_local_aspect(&self, aspect: &Aspect) -> bool {
        self.local_aspect(aspect).is_some()
    }

    pub fn resolved(&self) -> Option<&ResolvedState> {
        self.resolved.as_ref()
    }
}

/// Arena-based structural tree for one render pass.
///
/// All axes of a table (x, y and z) live in the same arena so that
/// z-inheritance and choice links are plain handles.
#[derive(Debug, Default)]
pub struct StructuralTree {
    arena: Arena<StructuralNode>,
    roots: Vec<NodeId>,
}

impl StructuralTree {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "trace", skip(self))]
    pub fn insert_root(&mut self, definition: DefinitionId, table: Option<DefinitionId>) -> NodeId {
        let mut node = StructuralNode::new(definition, None, 0);
        node.table = table;
        let idx = self.arena.insert(node);
        self.roots.push(idx);
        idx
    }

    /// Insert a node that is not yet part of any tree.
    #[instrument(level = "trace", skip(self))]
    pub fn insert_detached(&mut self, definition: DefinitionId) -> NodeId {
        self.arena.insert(StructuralNode::new(definition, None, 0))
    }

    /// Attach a detached node below `parent`. A node has at most one parent.
    #[instrument(level = "trace", skip(self))]
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomainError> {
        let parent_depth = self.node(parent)?.depth;
        let child_node = self.node_mut(child)?;
        if child_node.parent.is_some() {
            return Err(DomainError::AlreadyParented(format!("{:?}", child)));
        }
        child_node.parent = Some(parent);
        child_node.depth = parent_depth + 1;
        self.roots.retain(|r| *r != child);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn insert_child(&mut self, parent: NodeId, definition: DefinitionId) -> Result<NodeId, DomainError> {
        self.node(parent)?;
        let child = self.insert_detached(definition);
        self.attach_child(parent, child)?;
        Ok(child)
    }

    /// Add a choice alternative to `owner`. The alternative shares the
    /// owner's parent but is not one of its children.
    #[instrument(level = "trace", skip(self))]
    pub fn add_choice(&mut self, owner: NodeId, definition: DefinitionId) -> Result<NodeId, DomainError> {
        let (parent, depth) = {
            let node = self.node(owner)?;
            (node.parent, node.depth)
        };
        let mut alternative = StructuralNode::new(definition, parent, depth);
        alternative.table = self.node(owner)?.table;
        let idx = self.arena.insert(alternative);
        self.node_mut(owner)?.choices.push(idx);
        Ok(idx)
    }

    pub fn select_choice(&mut self, owner: NodeId, index: usize) -> Result<(), DomainError> {
        let node = self.node_mut(owner)?;
        if node.choices.is_empty() {
            return Err(DomainError::NoChoices(format!("{:?}", owner)));
        }
        if index >= node.choices.len() {
            return Err(DomainError::ChoiceOutOfRange {
                node: format!("{:?}", owner),
                index,
                count: node.choices.len(),
            });
        }
        node.choice_index = index;
        Ok(())
    }

    /// The currently selected alternative of a choice node.
    pub fn selected_choice(&self, owner: NodeId) -> Result<NodeId, DomainError> {
        let node = self.node(owner)?;
        node.choices
            .get(node.choice_index)
            .copied()
            .ok_or_else(|| DomainError::NoChoices(format!("{:?}", owner)))
    }

    /// The node that answers aspect, header and evaluation queries for
    /// `node`: the selected alternative for a choice node, else itself.
    pub fn active(&self, node: NodeId) -> NodeId {
        match self.arena.get(node) {
            Some(n) if !n.choices.is_empty() => n.choices.get(n.choice_index).copied().unwrap_or(node),
            _ => node,
        }
    }

    pub fn set_roll_up_child(&mut self, node: NodeId, child: NodeId) -> Result<(), DomainError> {
        let n = self.node_mut(node)?;
        if !n.children.contains(&child) {
            return Err(DomainError::RollUpNotChild {
                node: format!("{:?}", node),
                rollup: format!("{:?}", child),
            });
        }
        n.roll_up_child = Some(child);
        Ok(())
    }

    pub fn set_z_inheritance(&mut self, node: NodeId, z: NodeId) -> Result<(), DomainError> {
        self.node(z)?;
        self.node_mut(node)?.z_inheritance = Some(z);
        Ok(())
    }

    /// Set a local aspect override, replacing an earlier one for the same aspect.
    pub fn set_aspect(&mut self, node: NodeId, aspect: Aspect, value: Value) -> Result<(), DomainError> {
        let n = self.node_mut(node)?;
        match n.aspects.iter_mut().find(|(a, _)| *a == aspect) {
            Some(existing) => existing.1 = value,
            None => n.aspects.push((aspect, value)),
        }
        Ok(())
    }

    pub fn bind_variable(&mut self, node: NodeId, name: &str, value: Value) -> Result<(), DomainError> {
        self.node_mut(node)?.variables.insert(name.to_string(), value);
        Ok(())
    }

    pub fn bind_fact(&mut self, node: NodeId, fact: FactId) -> Result<(), DomainError> {
        self.node_mut(node)?.context_fact = Some(fact);
        Ok(())
    }

    pub fn set_subtree_roll_up(&mut self, node: NodeId, roll_up: RollUp) -> Result<(), DomainError> {
        self.node_mut(node)?.subtree_roll_up = roll_up;
        Ok(())
    }

    pub fn set_abstract(&mut self, node: NodeId, flag: bool) -> Result<(), DomainError> {
        self.node_mut(node)?.abstract_override = Some(flag);
        Ok(())
    }

    pub fn set_selection_binding(&mut self, node: NodeId, flag: bool) -> Result<(), DomainError> {
        self.node_mut(node)?.selection_binding = flag;
        Ok(())
    }

    pub fn set_resolved(&mut self, node: NodeId, state: ResolvedState) -> Result<(), DomainError> {
        self.node_mut(node)?.resolved = Some(state);
        Ok(())
    }

    /// Effective abstractness: the roll-up classification once analyzed,
    /// else the local override, else the definition's flag.
    pub fn is_abstract(&self, node: NodeId, model: &DefinitionModel) -> Result<bool, DomainError> {
        let n = self.node(node)?;
        if n.subtree_roll_up != RollUp::NotAnalyzed {
            return Ok(n.subtree_roll_up == RollUp::ChildrenNoRollUp);
        }
        if let Some(flag) = n.abstract_override {
            return Ok(flag);
        }
        let active = self.node(self.active(node))?;
        Ok(model.node(active.definition)?.is_abstract())
    }

    pub fn is_roll_up(&self, node: NodeId, model: &DefinitionModel) -> Result<bool, DomainError> {
        let active = self.node(self.active(node))?;
        Ok(model.node(active.definition)?.is_roll_up())
    }

    /// Accumulated tag selectors: the resolved value when the resolved-state
    /// pass has run, else derived from the ancestors on the fly.
    pub fn tag_selectors(&self, node: NodeId, model: &DefinitionModel) -> Result<TagSelectors, DomainError> {
        let n = self.node(node)?;
        if let Some(resolved) = &n.resolved {
            return Ok(resolved.tag_selectors.clone());
        }
        let parent = match n.parent {
            Some(p) => Some(self.tag_selectors(p, model)?),
            None => None,
        };
        let own = model.node(n.definition)?.tag_selector.as_deref();
        Ok(TagSelectors::accumulate(parent.as_ref(), own))
    }

    /// Table definition owning the tree `node` belongs to.
    pub fn table_of(&self, node: NodeId) -> Option<DefinitionId> {
        let mut current = Some(node);
        while let Some(idx) = current {
            let n = self.arena.get(idx)?;
            if n.parent.is_none() {
                return n.table;
            }
            current = n.parent;
        }
        None
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node(&self, idx: NodeId) -> Option<&StructuralNode> {
        self.arena.get(idx)
    }

    pub fn node(&self, idx: NodeId) -> Result<&StructuralNode, DomainError> {
        self.arena
            .get(idx)
            .ok_or_else(|| DomainError::UnknownNode(format!("{:?}", idx)))
    }

    fn node_mut(&mut self, idx: NodeId) -> Result<&mut StructuralNode, DomainError> {
        self.arena
            .get_mut(idx)
            .ok_or_else(|| DomainError::UnknownNode(format!("{:?}", idx)))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self, root: NodeId) -> TreeIterator<'_> {
        TreeIterator::new(self, root)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self, root: NodeId) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self, root)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self, root: NodeId) -> usize {
        match self.get_node(root) {
            Some(node) => {
                1 + node
                    .children
                    .iter()
                    .map(|&child| self.depth(child))
                    .max()
                    .unwrap_or(0)
            }
            None => 0,
        }
    }

    /// Nodes without children, left to right.
    #[instrument(level = "debug", skip(self))]
    pub fn leaf_nodes(&self, root: NodeId) -> Vec<NodeId> {
        self.iter(root)
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Render the subtree below `root`; choice alternatives are listed in
    /// brackets after their owner.
    pub fn to_tree(&self, root: NodeId, label: &dyn Fn(NodeId) -> String) -> Tree<String> {
        let mut tree = Tree::new(label(root));
        if let Some(node) = self.get_node(root) {
            for (i, &choice) in node.choices.iter().enumerate() {
                let marker = if i == node.choice_index { "*" } else { " " };
                tree.push(Tree::new(format!("[{}] {}", marker, label(choice))));
            }
            for &child in &node.children {
                tree.push(self.to_tree(child, label));
            }
        }
        tree
    }
}

pub struct TreeIterator<'a> {
    tree: &'a StructuralTree,
    stack: Vec<NodeId>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a StructuralTree, root: NodeId) -> Self {
        Self { tree, stack: vec![root] }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (NodeId, &'a StructuralNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    tree: &'a StructuralTree,
    stack: Vec<(NodeId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(tree: &'a StructuralTree, root: NodeId) -> Self {
        Self {
            tree,
            stack: vec![(root, false)],
        }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (NodeId, &'a StructuralNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::{DefinitionNode, NodeKind, Ordinate};

    fn model_with(ids: &[&str]) -> (DefinitionModel, Vec<DefinitionId>) {
        let mut model = DefinitionModel::new();
        let ids = ids
            .iter()
            .map(|id| {
                model
                    .insert(DefinitionNode::new(id, NodeKind::Breakdown { ordinate: Ordinate::X }), None)
                    .unwrap()
            })
            .collect();
        (model, ids)
    }

    #[test]
    fn test_depth_follows_parent() {
        let (_, defs) = model_with(&["a"]);
        let mut tree = StructuralTree::new();
        let root = tree.insert_root(defs[0], None);
        let child = tree.insert_child(root, defs[0]).unwrap();
        let grandchild = tree.insert_child(child, defs[0]).unwrap();

        assert_eq!(tree.node(root).unwrap().depth, 0);
        assert_eq!(tree.node(grandchild).unwrap().depth, 2);
        assert_eq!(tree.depth(root), 3);
        assert_eq!(tree.leaf_nodes(root), vec![grandchild]);
    }

    #[test]
    fn test_second_parent_is_rejected() {
        let (_, defs) = model_with(&["a"]);
        let mut tree = StructuralTree::new();
        let a = tree.insert_root(defs[0], None);
        let b = tree.insert_root(defs[0], None);
        let child = tree.insert_child(a, defs[0]).unwrap();

        let result = tree.attach_child(b, child);
        assert!(matches!(result, Err(DomainError::AlreadyParented(_))));
    }

    #[test]
    fn test_select_choice_without_alternatives_fails() {
        let (_, defs) = model_with(&["a", "b"]);
        let mut tree = StructuralTree::new();
        let root = tree.insert_root(defs[0], None);

        assert!(matches!(tree.select_choice(root, 0), Err(DomainError::NoChoices(_))));
        assert!(tree.selected_choice(root).is_err());
        assert_eq!(tree.active(root), root);

        let alt = tree.add_choice(root, defs[1]).unwrap();
        assert_eq!(tree.active(root), alt);
        assert!(matches!(
            tree.select_choice(root, 3),
            Err(DomainError::ChoiceOutOfRange { index: 3, count: 1, .. })
        ));
    }

    #[test]
    fn test_postorder_visits_children_first() {
        let (_, defs) = model_with(&["a"]);
        let mut tree = StructuralTree::new();
        let root = tree.insert_root(defs[0], None);
        let c1 = tree.insert_child(root, defs[0]).unwrap();
        let c2 = tree.insert_child(root, defs[0]).unwrap();

        let order: Vec<NodeId> = tree.iter_postorder(root).map(|(idx, _)| idx).collect();
        assert_eq!(order, vec![c1, c2, root]);
        let preorder: Vec<NodeId> = tree.iter(root).map(|(idx, _)| idx).collect();
        assert_eq!(preorder, vec![root, c1, c2]);
    }

    #[test]
    fn test_roll_up_child_must_be_a_child() {
        let (_, defs) = model_with(&["a"]);
        let mut tree = StructuralTree::new();
        let root = tree.insert_root(defs[0], None);
        let other = tree.insert_root(defs[0], None);
        assert!(tree.set_roll_up_child(root, other).is_err());
        let child = tree.insert_child(root, defs[0]).unwrap();
        assert!(tree.set_roll_up_child(root, child).is_ok());
    }

    #[test]
    fn test_tag_selectors_accumulate_without_resolved_pass() {
        let mut model = DefinitionModel::new();
        let a = model
            .insert(
                DefinitionNode::new("a", NodeKind::Breakdown { ordinate: Ordinate::X }).with_tag_selector("B"),
                None,
            )
            .unwrap();
        let b = model
            .insert(DefinitionNode::new("b", NodeKind::Composition).with_tag_selector("A"), Some(a))
            .unwrap();
        let mut tree = StructuralTree::new();
        let root = tree.insert_root(a, None);
        let child = tree.insert_child(root, b).unwrap();

        let selectors = tree.tag_selectors(child, &model).unwrap();
        assert_eq!(selectors.iter().collect::<Vec<_>>(), vec!["B", "A"]);
    }
}
