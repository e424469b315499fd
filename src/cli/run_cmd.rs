//! `run`: the full resumable pipeline

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use super::output::Output;
use crate::pipeline::PipelineOrchestrator;
use crate::storage::{Config, ResultsLedger};

pub fn run(
    output: &Output,
    mut config: Config,
    path: &Path,
    ledger: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<()> {
    if let Some(path) = ledger {
        config.ledger.path = path;
    }
    if let Some(secs) = timeout {
        config.pipeline.timeout_secs = secs;
    }

    let mut ledger = ResultsLedger::open(&config.ledger.path)
        .with_context(|| format!("Failed to open ledger: {}", config.ledger.path.display()))?;
    output.verbose_ctx(
        "run",
        &format!(
            "{} model(s) already recorded in {}",
            ledger.len(),
            ledger.path().display()
        ),
    );

    let started = Utc::now();
    let orchestrator = PipelineOrchestrator::from_config(&config);
    let summary = orchestrator.run_batch(path, &mut ledger)?;
    let finished = Utc::now();

    if output.is_json() {
        output.data(&serde_json::json!({
            "summary": summary,
            "ledger": ledger.path().display().to_string(),
            "started_at": started.to_rfc3339(),
            "finished_at": finished.to_rfc3339(),
        }));
    } else {
        output.success(&format!(
            "Processed {} model(s): {} succeeded, {} failed, {} skipped",
            summary.processed,
            summary.succeeded,
            summary.failed_total(),
            summary.skipped
        ));
        for (status, count) in &summary.failed {
            output.row(&["", status.label(), count.to_string().as_str()]);
        }
        let elapsed = finished - started;
        output.success(&format!(
            "Results in {} ({}s)",
            ledger.path().display(),
            elapsed.num_seconds()
        ));
    }

    Ok(())
}
