//! Application services
//!
//! The resolution engine proper. A [`RenderPass`] borrows one definition
//! model, one structural tree, the candidate facts and the collaborators;
//! its operations are split by concern across the submodules. The
//! [`StructuralTreeBuilder`] produces the tree a pass reads.

use std::sync::Arc;

use crate::config::Settings;
use crate::domain::{DefinitionModel, ExpressionEngine, FactSet, StructuralTree};
use crate::infrastructure::traits::{FactFilter, LabelStore, RelationshipStore, TypedValueValidator};

mod builder;
mod cascade;
mod evaluation;
mod facts;
mod header;
mod sizing;
mod traversal;

pub use builder::{StructuralTreeBuilder, TableAxes};
pub use evaluation::EvalRequest;
pub use header::HeaderRequest;
pub use traversal::GraphWalker;

/// Collaborators shared by every render pass.
#[derive(Clone)]
pub struct RenderServices {
    pub engine: Arc<dyn ExpressionEngine>,
    pub graph: Arc<dyn RelationshipStore>,
    pub labels: Arc<dyn LabelStore>,
    pub filter: Arc<dyn FactFilter>,
    pub validator: Arc<dyn TypedValueValidator>,
}

/// Per-pass knobs, taken from [`Settings`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Default label language; `None` accepts any language.
    pub lang: Option<String>,
    pub label_role: String,
    /// Cap for unlimited traversals; 0 = no cap.
    pub max_generations: u32,
    pub dimension_arcroles: Vec<String>,
    pub log_failures: bool,
}

impl From<&Settings> for RenderOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lang: Some(settings.lang.clone()).filter(|l| !l.is_empty()),
            label_role: settings.label_role.clone(),
            max_generations: settings.traversal.max_generations,
            dimension_arcroles: settings.traversal.dimension_arcroles.clone(),
            log_failures: settings.evaluation.log_failures,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Read-only view over one render pass.
///
/// The shared [`EvalContext`](crate::domain::EvalContext) is passed to every
/// operation that may evaluate an expression; it leaves each call with the
/// bindings it entered with.
pub struct RenderPass<'a> {
    pub model: &'a DefinitionModel,
    pub tree: &'a StructuralTree,
    pub facts: &'a FactSet,
    pub services: &'a RenderServices,
    pub options: &'a RenderOptions,
}

impl<'a> RenderPass<'a> {
    pub fn new(
        model: &'a DefinitionModel,
        tree: &'a StructuralTree,
        facts: &'a FactSet,
        services: &'a RenderServices,
        options: &'a RenderOptions,
    ) -> Self {
        Self {
            model,
            tree,
            facts,
            services,
            options,
        }
    }

    fn walker(&self) -> GraphWalker<'a> {
        GraphWalker::new(self.services.graph.as_ref(), self.options.max_generations)
    }
}
