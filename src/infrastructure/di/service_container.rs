//! Service container for dependency injection
//!
//! Wires up the collaborators a render pass needs.

use std::path::Path;
use std::sync::Arc;

use tracing::instrument;

use crate::application::{
    ApplicationError, RenderOptions, RenderPass, RenderServices, StructuralTreeBuilder, TableAxes,
};
use crate::config::Settings;
use crate::domain::{DefinitionId, DefinitionModel, ExpressionEngine, FactSet, StructuralTree};
use crate::infrastructure::document::{Document, DocumentLoader};
use crate::infrastructure::error::InfraResult;
use crate::infrastructure::expr::SimpleEngine;
use crate::infrastructure::memory::AspectFactFilter;
use crate::infrastructure::traits::{FactFilter, FileSystem, RealFileSystem, TypedValueValidator};
use crate::infrastructure::validator::XsdValidator;

/// Container holding the document-independent services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    pub engine: Arc<dyn ExpressionEngine>,
    pub filter: Arc<dyn FactFilter>,
    pub validator: Arc<dyn TypedValueValidator>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem), Arc::new(SimpleEngine))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>, engine: Arc<dyn ExpressionEngine>) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
            engine,
            filter: Arc::new(AspectFactFilter),
            validator: Arc::new(XsdValidator),
        }
    }

    /// Load and compile a document, binding its graph and labels into
    /// render services.
    #[instrument(level = "debug", skip(self))]
    pub fn load_document(&self, path: &Path) -> InfraResult<LoadedDocument> {
        let doc = DocumentLoader::new(self.fs.clone()).load(path)?;
        Ok(self.bind(doc))
    }

    /// Compile a parsed document and bind it to this container's services.
    pub fn bind(&self, doc: Document) -> LoadedDocument {
        doc.model.compile(self.engine.as_ref());
        LoadedDocument {
            model: doc.model,
            facts: doc.facts,
            services: RenderServices {
                engine: self.engine.clone(),
                graph: Arc::new(doc.graph),
                labels: Arc::new(doc.labels),
                filter: self.filter.clone(),
                validator: self.validator.clone(),
            },
            options: RenderOptions::from(self.settings.as_ref()),
        }
    }
}

/// A compiled document together with the services rendering it.
pub struct LoadedDocument {
    pub model: DefinitionModel,
    pub facts: FactSet,
    pub services: RenderServices,
    pub options: RenderOptions,
}

impl LoadedDocument {
    /// The table with the given id, or every table when `id` is `None`.
    pub fn tables(&self, id: Option<&str>) -> InfraResult<Vec<DefinitionId>> {
        match id {
            None => Ok(self.model.tables().to_vec()),
            Some(id) => self
                .model
                .find(id)
                .filter(|t| self.model.tables().contains(t))
                .map(|t| vec![t])
                .ok_or_else(|| ApplicationError::TableNotFound(id.to_string()).into()),
        }
    }

    /// Build the structural tree of one table.
    pub fn build(&self, table: DefinitionId) -> InfraResult<(StructuralTree, TableAxes)> {
        let mut builder = StructuralTreeBuilder::new(&self.model, &self.facts, &self.services, &self.options);
        let axes = builder.build_table(table)?;
        Ok((builder.into_tree(), axes))
    }

    pub fn pass<'a>(&'a self, tree: &'a StructuralTree) -> RenderPass<'a> {
        RenderPass::new(&self.model, tree, &self.facts, &self.services, &self.options)
    }
}
