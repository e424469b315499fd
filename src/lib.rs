//! uvl2bdd - feature models to BDDs
//!
//! Reads UVL feature models, compiles them to propositional logic files and
//! drives an external BDD toolchain over large model collections, recording
//! one resumable results row per model.

pub mod cli;
pub mod domain;
pub mod pipeline;
pub mod storage;

pub use domain::{compile, FeatureModel, Formula, NameMapping, RelationKind};
pub use pipeline::{BatchSummary, PipelineOrchestrator, RunStatus};
