//! BDD toolchain invocations
//!
//! | Stage | Command |
//! |-------|---------|
//! | Order | `orderer <flags> <var> <exp> <name>-sifting.var` |
//! | Build | `compiler -out <artifact> -constraint-reorder <s> -min-nodes <n> -score <order> <var> <exp>` |
//! | Count | `counter <artifact>` |
//!
//! The compiler's last stdout line reports its run time as `<int> ms`; when
//! that line is missing the compiler gave up without saying so.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use num_bigint::BigUint;
use thiserror::Error;

use super::stage::{ProcessStage, StageOutcome};
use crate::storage::{LogicFiles, PipelineConfig, ToolsConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Cannot read BDD artifact {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("BDD artifact {0} has no .nnodes header")]
    MissingHeader(PathBuf),

    #[error("Invalid .nnodes value in {path}: {value}")]
    InvalidHeader { path: PathBuf, value: String },

    #[error("Configuration counter timed out")]
    CounterTimeout,

    #[error("Configuration counter failed: {0}")]
    CounterFailed(String),

    #[error("Counter printed a non-integer: {0:?}")]
    InvalidCount(String),
}

/// Builds the external stages for one pipeline configuration
#[derive(Debug, Clone)]
pub struct Toolchain {
    tools: ToolsConfig,
    timeout: Duration,
    min_nodes: u64,
    constraint_reorder: String,
}

impl Toolchain {
    pub fn new(tools: &ToolsConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            tools: tools.clone(),
            timeout: pipeline.timeout(),
            min_nodes: pipeline.min_nodes,
            constraint_reorder: pipeline.constraint_reorder.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Variable ordering; writes `<name>-sifting.var` next to the variables file
    pub fn order_stage(&self, files: &LogicFiles) -> ProcessStage {
        let output = files.order_path();
        ProcessStage::new("order", &self.tools.orderer)
            .args(&self.tools.order_flags)
            .arg(&files.var)
            .arg(&files.exp)
            .arg(&output)
            .timeout(self.timeout)
            .expect_artifact(output)
    }

    /// BDD compilation into `artifact`, scored by the order file
    pub fn build_stage(&self, files: &LogicFiles, order: &Path, artifact: &Path) -> ProcessStage {
        ProcessStage::new("build", &self.tools.compiler)
            .arg("-out")
            .arg(artifact)
            .arg("-constraint-reorder")
            .arg(&self.constraint_reorder)
            .arg("-min-nodes")
            .arg(self.min_nodes.to_string())
            .arg("-score")
            .arg(order)
            .arg(&files.var)
            .arg(&files.exp)
            .timeout(self.timeout)
            .expect_artifact(artifact)
            .success_marker(has_timing_marker)
    }

    pub fn count_stage(&self, artifact: &Path) -> ProcessStage {
        ProcessStage::new("count", &self.tools.counter)
            .arg(artifact)
            .timeout(self.timeout)
    }

    /// Runs the counter and parses its output as an arbitrary-precision integer
    pub fn count_configurations(&self, artifact: &Path) -> Result<BigUint, AnalysisError> {
        match self.count_stage(artifact).run() {
            StageOutcome::Completed(report) => parse_count(&report.stdout),
            StageOutcome::TimedOut { .. } => Err(AnalysisError::CounterTimeout),
            StageOutcome::Failed { diagnostic, .. } => Err(AnalysisError::CounterFailed(diagnostic)),
        }
    }
}

/// True when the last non-empty stdout line contains `<digits> ms`
///
/// `ms` must end a word, so `12 msgs` does not count.
pub fn has_timing_marker(stdout: &str) -> bool {
    let last = match stdout.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => line,
        None => return false,
    };

    let bytes = last.as_bytes();
    let mut search = 0;
    while let Some(offset) = last[search..].find("ms") {
        let at = search + offset;
        let mut end = at;
        while end > 0 && bytes[end - 1] == b' ' {
            end -= 1;
        }
        let word_end =
            !matches!(bytes.get(at + 2), Some(b) if b.is_ascii_alphanumeric() || *b == b'_');
        if word_end && end > 0 && bytes[end - 1].is_ascii_digit() {
            return true;
        }
        search = at + 2;
    }
    false
}

fn parse_count(stdout: &str) -> Result<BigUint, AnalysisError> {
    let text = stdout.trim();
    text.parse::<BigUint>()
        .map_err(|_| AnalysisError::InvalidCount(text.to_string()))
}

/// Reads `N` from the `.nnodes N` line of a DDDMP header
pub fn read_node_count(artifact: &Path) -> Result<u64, AnalysisError> {
    let unreadable = |e: std::io::Error| AnalysisError::Unreadable {
        path: artifact.to_path_buf(),
        message: e.to_string(),
    };

    let file = fs::File::open(artifact).map_err(unreadable)?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(unreadable)?;
        if read == 0 {
            return Err(AnalysisError::MissingHeader(artifact.to_path_buf()));
        }

        let line = String::from_utf8_lossy(&buf);
        if let Some(rest) = line.strip_prefix(".nnodes") {
            let value = rest.split_whitespace().next().unwrap_or_default();
            return value.parse().map_err(|_| AnalysisError::InvalidHeader {
                path: artifact.to_path_buf(),
                value: value.to_string(),
            });
        }
    }
}
