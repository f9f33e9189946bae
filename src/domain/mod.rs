//! Domain layer: aspect model, definition nodes and the structural tree
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod aspect;
pub mod constraint;
pub mod definition;
pub mod error;
pub mod expression;
pub mod relationship;
pub mod value;

pub use arena::{NodeId, ResolvedState, RollUp, StructuralNode, StructuralTree};
pub use aspect::{Aspect, QName};
pub use constraint::{AspectRule, ConstraintSet, ConstraintSets, RuleSource, TagSelectors};
pub use definition::{
    AspectNode, ConceptRelationshipNode, DefinitionId, DefinitionModel, DefinitionNode, DimensionRelationshipNode,
    EuAxisCoord, FilterNode, FilterSpec, NodeKind, Ordinate, order_filters, Param, ParentChildOrder, RelationshipSpec,
    SelectionNode, TableNode,
};
pub use error::DomainError;
pub use expression::{CompileError, CompiledProgram, EvalContext, EvalError, Expression, ExpressionEngine, Program};
pub use relationship::{Axis, AxisSpec, Edge, RelNode, RelationshipQuery};
pub use value::{DimensionMember, Fact, FactId, FactSet, StructuredValue, Value};
