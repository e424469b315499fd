//! Pipeline layer
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `stage` | external process with timeout and group kill |
//! | `tools` | ordering, compile and count invocations |
//! | `run` | per-model record and status |
//! | `orchestrator` | batch and build-mode drivers |

mod orchestrator;
mod run;
mod stage;
mod tools;

pub use orchestrator::{
    compile_to_files, discover_logic, discover_models, BatchSummary, CompiledLogic,
    PipelineOrchestrator,
};
pub use run::{FinishedRun, PipelineRun, RunStatus, Stage};
pub use stage::{FailureKind, ProcessStage, StageOutcome, StageReport, SuccessMarker};
pub use tools::{has_timing_marker, read_node_count, AnalysisError, Toolchain};
