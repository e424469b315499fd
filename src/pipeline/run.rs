//! Per-model pipeline record
//!
//! A [`PipelineRun`] collects metrics while one model moves through the
//! stages. It is consumed by [`PipelineRun::finish`] at the first failure or
//! at full success, yielding a [`FinishedRun`] that maps onto one ledger row.

use std::fmt;
use std::time::Duration;

use num_bigint::BigUint;
use serde::Serialize;

use crate::storage::{float2exp, format_count, Cell, LedgerRow};

/// Terminal outcome of one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RunStatus {
    Success,
    SyntaxError,
    LogicError,
    OrderTimeout,
    OrderError,
    BuildTimeout,
    BuildError,
    MissingFile,
    AnalysisError,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Success => "Success",
            RunStatus::SyntaxError => "SyntaxError",
            RunStatus::LogicError => "LogicError",
            RunStatus::OrderTimeout => "OrderTimeout",
            RunStatus::OrderError => "OrderError",
            RunStatus::BuildTimeout => "BuildTimeout",
            RunStatus::BuildError => "BuildError",
            RunStatus::MissingFile => "MissingFile",
            RunStatus::AnalysisError => "AnalysisError",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == RunStatus::Success
    }

    fn is_timeout(&self) -> bool {
        matches!(self, RunStatus::OrderTimeout | RunStatus::BuildTimeout)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Compile,
    Order,
    Build,
    Analyze,
}

/// Metrics of a model still being processed
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub model: String,
    pub features: Option<usize>,
    pub constraints: Option<usize>,
    pub compile_time: Option<Duration>,
    pub variables: Option<usize>,
    pub clauses: Option<usize>,
    pub mapping_written: bool,
    pub order_time: Option<Duration>,
    pub build_time: Option<Duration>,
    pub bdd_nodes: Option<u64>,
    pub configurations: Option<BigUint>,
    stage: Stage,
}

impl PipelineRun {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            features: None,
            constraints: None,
            compile_time: None,
            variables: None,
            clauses: None,
            mapping_written: false,
            order_time: None,
            build_time: None,
            bdd_nodes: None,
            configurations: None,
            stage: Stage::Parse,
        }
    }

    /// Marks the stage now running; a failure is charged to it
    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Finalizes the run
    pub fn finish(self, status: RunStatus) -> FinishedRun {
        let failed_stage = if status.is_success() {
            None
        } else {
            Some(self.stage)
        };
        FinishedRun {
            run: self,
            status,
            failed_stage,
        }
    }
}

/// A run with its terminal status
#[derive(Debug, Clone)]
pub struct FinishedRun {
    pub run: PipelineRun,
    pub status: RunStatus,
    pub failed_stage: Option<Stage>,
}

impl FinishedRun {
    /// Ledger row; times use `precision` decimals
    pub fn to_ledger_row(&self, precision: usize) -> LedgerRow {
        let run = &self.run;
        let marker = if self.status.is_timeout() {
            Cell::Timeout
        } else {
            Cell::Error
        };
        let cell = |value: Option<String>, stage: Stage| match value {
            Some(v) => Cell::Value(v),
            None if self.failed_stage == Some(stage) => marker.clone(),
            None => Cell::NotRun,
        };
        let time = |d: Option<Duration>| d.map(|d| float2exp(d.as_secs_f64(), precision));

        LedgerRow {
            model: run.model.clone(),
            features: cell(run.features.map(|n| n.to_string()), Stage::Parse),
            constraints: cell(run.constraints.map(|n| n.to_string()), Stage::Parse),
            compile_time: cell(time(run.compile_time), Stage::Compile),
            variables: cell(run.variables.map(|n| n.to_string()), Stage::Compile),
            clauses: cell(run.clauses.map(|n| n.to_string()), Stage::Compile),
            order_time: cell(time(run.order_time), Stage::Order),
            build_time: cell(time(run.build_time), Stage::Build),
            bdd_nodes: cell(run.bdd_nodes.map(|n| n.to_string()), Stage::Analyze),
            configurations: cell(run.configurations.as_ref().map(format_count), Stage::Analyze),
            status: self.status.label().to_string(),
        }
    }
}
