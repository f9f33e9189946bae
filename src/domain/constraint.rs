//! Constraint sets: tagged bundles of aspect rules, and tag-selector resolution.

use std::collections::BTreeSet;

use crate::domain::aspect::{Aspect, QName};
use crate::domain::expression::{ExpressionEngine, Expression};
use crate::domain::value::Value;

/// Ordered set of tag selectors accumulated from a node and its ancestors.
///
/// Insertion order is significant: resolution tests tags in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSelectors(Vec<String>);

impl TagSelectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent's accumulated selectors followed by the node's own selector.
    pub fn accumulate(parent: Option<&TagSelectors>, own: Option<&str>) -> Self {
        let mut result = parent.cloned().unwrap_or_default();
        if let Some(tag) = own {
            result.insert(tag);
        }
        result
    }

    pub fn insert(&mut self, tag: &str) -> bool {
        if self.contains(tag) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSelectors {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut result = TagSelectors::new();
        for tag in iter {
            result.insert(tag.as_ref());
        }
        result
    }
}

/// Where an aspect rule's value comes from.
#[derive(Debug, Clone)]
pub enum RuleSource {
    Value(Value),
    Expression(Expression),
}

#[derive(Debug, Clone)]
pub struct AspectRule {
    pub aspect: Aspect,
    pub source: RuleSource,
}

/// A bundle of aspect rules, optionally tagged.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    pub tag: Option<String>,
    rules: Vec<AspectRule>,
    omitted: BTreeSet<QName>,
    location_source: Option<String>,
}

impl ConstraintSet {
    pub fn new(tag: Option<&str>) -> Self {
        Self {
            tag: tag.map(str::to_string),
            ..Self::default()
        }
    }

    /// Add (or replace) the rule for an aspect, keeping declaration order.
    pub fn with_rule(mut self, aspect: Aspect, source: RuleSource) -> Self {
        match self.rules.iter_mut().find(|r| r.aspect == aspect) {
            Some(existing) => existing.source = source,
            None => self.rules.push(AspectRule { aspect, source }),
        }
        self
    }

    pub fn with_value(self, aspect: Aspect, value: Value) -> Self {
        self.with_rule(aspect, RuleSource::Value(value))
    }

    pub fn with_expression(self, aspect: Aspect, text: &str) -> Self {
        self.with_rule(aspect, RuleSource::Expression(Expression::new(text)))
    }

    pub fn with_omitted(mut self, dimension: QName) -> Self {
        self.omitted.insert(dimension);
        self
    }

    /// LOCATION is supplied by the named variable (tuple content).
    pub fn with_location_source(mut self, variable: &str) -> Self {
        self.location_source = Some(variable.to_string());
        self
    }

    pub fn location_source(&self) -> Option<&str> {
        self.location_source.as_deref()
    }

    pub fn rules(&self) -> &[AspectRule] {
        &self.rules
    }

    pub fn rule(&self, aspect: &Aspect) -> Option<&RuleSource> {
        self.rules.iter().find(|r| &r.aspect == aspect).map(|r| &r.source)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.omitted.is_empty() && self.location_source.is_none()
    }

    pub fn has_aspect(&self, aspect: &Aspect) -> bool {
        match aspect {
            Aspect::Location if self.location_source.is_some() => true,
            Aspect::Dimensions => self.rules.iter().any(|r| r.aspect.is_dimension()),
            Aspect::OmitDimensions => !self.omitted.is_empty(),
            other => self.rule(other).is_some(),
        }
    }

    /// Dimensions given an explicit member rule by this set.
    pub fn declared_dimensions(&self) -> BTreeSet<QName> {
        self.rules
            .iter()
            .filter_map(|r| r.aspect.dimension().cloned())
            .collect()
    }

    pub fn omitted_dimensions(&self) -> &BTreeSet<QName> {
        &self.omitted
    }

    /// Aspects in declaration order; DIMENSIONS / OMIT-DIMENSIONS trail the
    /// individual rules when present.
    pub fn aspects_covered(&self) -> Vec<Aspect> {
        let mut covered: Vec<Aspect> = self.rules.iter().map(|r| r.aspect.clone()).collect();
        if self.location_source.is_some() && !covered.contains(&Aspect::Location) {
            covered.push(Aspect::Location);
        }
        if self.has_aspect(&Aspect::Dimensions) {
            covered.push(Aspect::Dimensions);
        }
        if self.has_aspect(&Aspect::OmitDimensions) {
            covered.push(Aspect::OmitDimensions);
        }
        covered
    }

    pub fn compile(&self, engine: &dyn ExpressionEngine, owner: &str) {
        for rule in &self.rules {
            if let RuleSource::Expression(expr) = &rule.source {
                let _ = expr.program(engine, owner, &rule.aspect.to_string());
            }
        }
    }
}

/// All constraint sets of a node: the untagged default plus tagged ones.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSets {
    default: Option<ConstraintSet>,
    tagged: Vec<ConstraintSet>,
}

impl ConstraintSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(set: ConstraintSet) -> Self {
        Self::new().with_set(set)
    }

    /// Add a set; an untagged set becomes the default (only if it has rules).
    pub fn with_set(mut self, set: ConstraintSet) -> Self {
        match &set.tag {
            None if set.is_empty() => {}
            None => self.default = Some(set),
            Some(tag) => {
                self.tagged.retain(|s| s.tag.as_deref() != Some(tag.as_str()));
                self.tagged.push(set);
            }
        }
        self
    }

    pub fn default_set(&self) -> Option<&ConstraintSet> {
        self.default.as_ref()
    }

    pub fn tagged(&self, tag: &str) -> Option<&ConstraintSet> {
        self.tagged.iter().find(|s| s.tag.as_deref() == Some(tag))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstraintSet> {
        self.default.iter().chain(self.tagged.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.tagged.is_empty()
    }

    /// First tagged set whose tag appears in `selectors` (in selector order),
    /// else the untagged default, else none.
    pub fn resolve(&self, selectors: &TagSelectors) -> Option<&ConstraintSet> {
        selectors
            .iter()
            .find_map(|tag| self.tagged(tag))
            .or(self.default.as_ref())
    }

    pub fn has_aspect(&self, aspect: &Aspect) -> bool {
        self.iter().any(|s| s.has_aspect(aspect))
    }

    /// Union of every set's aspects, first-declared first.
    pub fn aspects_covered(&self) -> Vec<Aspect> {
        let mut covered = Vec::new();
        for aspect in self.iter().flat_map(|s| s.aspects_covered()) {
            if !covered.contains(&aspect) {
                covered.push(aspect);
            }
        }
        covered
    }

    /// Non-DIMENSIONS aspects declared by any tagged set.
    pub fn aspects_in_tagged_sets(&self) -> BTreeSet<Aspect> {
        self.tagged
            .iter()
            .flat_map(|s| s.aspects_covered())
            .filter(|a| *a != Aspect::Dimensions)
            .collect()
    }

    pub fn compile(&self, engine: &dyn ExpressionEngine, owner: &str) {
        for set in self.iter() {
            set.compile(engine, owner);
        }
    }
}
