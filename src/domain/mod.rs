//! Domain models for feature-model compilation
//!
//! Contains the feature model, its constraint language and the compiler to
//! propositional logic, without any I/O concerns.

mod expr;
mod formula;
mod model;
mod names;
mod tree;

pub use expr::{Connective, Constraint, Expr};
pub use formula::{compile, CompileError, Formula, FormulaCompiler};
pub use model::{Feature, FeatureId, FeatureModel, ModelError, Relation, RelationKind};
pub use names::{is_valid_identifier, NameMapping};
pub use tree::{FeatureTree, TreeError};
