//! `build`: order, build and analyze existing logic files

use std::path::PathBuf;

use anyhow::Result;

use super::output::Output;
use crate::pipeline::{BatchSummary, FinishedRun, PipelineOrchestrator};
use crate::storage::{Config, LogicFiles, HEADER};

/// What to build
pub enum Target {
    /// A `.var` file or a directory of logic files
    Path(PathBuf),
    Pair { var: PathBuf, exp: PathBuf },
}

pub fn run(
    output: &Output,
    mut config: Config,
    target: Target,
    bdd_dir: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<()> {
    if let Some(secs) = timeout {
        config.pipeline.timeout_secs = secs;
    }
    if bdd_dir.is_some() {
        config.pipeline.bdd_dir = bdd_dir;
    }
    let precision = config.ledger.precision;
    let orchestrator = PipelineOrchestrator::from_config(&config);

    let (summary, runs) = match target {
        Target::Pair { var, exp } => single(&orchestrator, LogicFiles::existing(var, exp)),
        Target::Path(path) if path.is_file() => {
            let exp = path.with_extension("exp");
            single(&orchestrator, LogicFiles::existing(path, exp))
        }
        Target::Path(path) => orchestrator.build_batch(&path)?,
    };

    if output.is_json() {
        let rows: Vec<_> = runs.iter().map(|r| row_json(r, precision)).collect();
        output.data(&serde_json::json!({
            "summary": summary,
            "models": rows,
        }));
    } else {
        output.row(&["MODEL", "STATUS", "ORDER (s)", "BUILD (s)", "NODES", "CONFIGURATIONS"]);
        for finished in &runs {
            let fields = finished.to_ledger_row(precision).fields();
            let columns: Vec<&str> = [0, 10, 6, 7, 8, 9].iter().map(|i| fields[*i].as_str()).collect();
            output.row(&columns);
        }
        output.blank();
        output.success(&format!(
            "Built {} of {} logic file pair(s)",
            summary.succeeded, summary.discovered
        ));
    }

    let failed = summary.failed_total();
    if failed > 0 {
        anyhow::bail!("{} build(s) failed", failed);
    }
    Ok(())
}

fn single(
    orchestrator: &PipelineOrchestrator,
    files: LogicFiles,
) -> (BatchSummary, Vec<FinishedRun>) {
    let finished = orchestrator.build_logic(&files);
    let mut summary = BatchSummary {
        discovered: 1,
        ..Default::default()
    };
    summary.record(finished.status);
    (summary, vec![finished])
}

/// Ledger columns of one run keyed by header
fn row_json(finished: &FinishedRun, precision: usize) -> serde_json::Value {
    let fields = finished.to_ledger_row(precision).fields();
    let object: serde_json::Map<String, serde_json::Value> = HEADER
        .iter()
        .zip(fields)
        .map(|(key, value)| (key.to_string(), serde_json::Value::String(value)))
        .collect();
    serde_json::Value::Object(object)
}
