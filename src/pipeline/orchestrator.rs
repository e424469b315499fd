//! Drives models through the pipeline
//!
//! Parse → Compile → Order → Build → Analyze. The first failing stage ends
//! the model with a [`RunStatus`]; per-model failures never become errors.
//! Only discovery and ledger I/O can abort a batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use walkdir::WalkDir;

use super::run::{FinishedRun, PipelineRun, RunStatus, Stage};
use super::stage::{FailureKind, StageOutcome};
use super::tools::{read_node_count, Toolchain};
use crate::domain::{compile, FeatureModel, NameMapping};
use crate::storage::{Config, LogicFiles, ModelReader, ResultsLedger, UvlReader};

/// Counts reported at the end of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: BTreeMap<RunStatus, usize>,
}

impl BatchSummary {
    pub fn record(&mut self, status: RunStatus) {
        self.processed += 1;
        if status.is_success() {
            self.succeeded += 1;
        } else {
            *self.failed.entry(status).or_insert(0) += 1;
        }
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }
}

/// Logic files written for one model
#[derive(Debug, Clone)]
pub struct CompiledLogic {
    pub files: LogicFiles,
    pub variables: usize,
    pub clauses: usize,
}

/// Sanitizes, compiles and writes the logic files of `model`
pub fn compile_to_files(model: &FeatureModel, dir: &Path, name: &str) -> Result<CompiledLogic> {
    let mapping = NameMapping::sanitize(model.feature_names());
    let formula = compile(model, &mapping)
        .with_context(|| format!("Failed to compile model {}", name))?;
    let files = LogicFiles::write(dir, name, &mapping, &formula)?;
    let variables = files.count_variables()?;
    let clauses = files.count_clauses()?;

    Ok(CompiledLogic {
        files,
        variables,
        clauses,
    })
}

/// Files under `root` with `extension`, sorted by path
///
/// A file root is returned as is. Symlinks are not followed.
pub fn discover_models(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", root.display()))?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == extension)
        {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// `.var` files under `root` with their `.exp` siblings, order outputs excluded
pub fn discover_logic(root: &Path) -> Result<Vec<LogicFiles>> {
    let vars = discover_models(root, "var")?;
    Ok(vars
        .into_iter()
        .filter(|var| {
            !var.file_stem()
                .is_some_and(|s| s.to_string_lossy().ends_with("-sifting"))
        })
        .map(|var| {
            let exp = var.with_extension("exp");
            LogicFiles::existing(var, exp)
        })
        .collect())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Runs models through the stages and records them
pub struct PipelineOrchestrator<R: ModelReader = UvlReader> {
    reader: R,
    toolchain: Toolchain,
    extension: String,
    logic_dir: Option<PathBuf>,
    bdd_dir: Option<PathBuf>,
    precision: usize,
}

impl PipelineOrchestrator<UvlReader> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(UvlReader, config)
    }
}

impl<R: ModelReader> PipelineOrchestrator<R> {
    pub fn new(reader: R, config: &Config) -> Self {
        Self {
            reader,
            toolchain: Toolchain::new(&config.tools, &config.pipeline),
            extension: config.pipeline.extension.clone(),
            logic_dir: config.pipeline.logic_dir.clone(),
            bdd_dir: config.pipeline.bdd_dir.clone(),
            precision: config.ledger.precision,
        }
    }

    /// Full pipeline for one model file
    pub fn process_model(&self, path: &Path) -> FinishedRun {
        let name = stem(path);
        let model_dir = path.parent().unwrap_or(Path::new("."));
        let mut run = PipelineRun::new(&name);

        run.enter(Stage::Parse);
        let model = match self.reader.read(path) {
            Ok(model) => model,
            Err(e) => {
                tracing::error!(model = %name, error = %e, "Syntax error");
                return run.finish(RunStatus::SyntaxError);
            }
        };
        run.features = Some(model.feature_count());
        run.constraints = Some(model.constraint_count());

        run.enter(Stage::Compile);
        let start = Instant::now();
        let logic_dir = self.logic_dir.as_deref().unwrap_or(model_dir);
        let compiled = match compile_to_files(&model, logic_dir, &name) {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::error!(model = %name, error = %format!("{:#}", e), "Logic error");
                return run.finish(RunStatus::LogicError);
            }
        };
        run.compile_time = Some(start.elapsed());
        run.variables = Some(compiled.variables);
        run.clauses = Some(compiled.clauses);
        run.mapping_written = compiled.files.mapping.is_some();
        tracing::debug!(
            model = %name,
            variables = compiled.variables,
            clauses = compiled.clauses,
            "Compiled logic files"
        );

        let bdd_dir = self.bdd_dir.as_deref().unwrap_or(model_dir);
        self.build(run, &compiled.files, bdd_dir)
    }

    /// Order → Build → Analyze for an existing `.var`/`.exp` pair
    ///
    /// The artifact goes to the configured BDD directory, or next to the
    /// variables file.
    pub fn build_logic(&self, files: &LogicFiles) -> FinishedRun {
        let run = PipelineRun::new(files.stem());
        let fallback = files.var.parent().unwrap_or(Path::new("."));
        let bdd_dir = self.bdd_dir.as_deref().unwrap_or(fallback);
        self.build(run, files, bdd_dir)
    }

    fn build(&self, mut run: PipelineRun, files: &LogicFiles, bdd_dir: &Path) -> FinishedRun {
        let name = run.model.clone();

        run.enter(Stage::Order);
        for input in [&files.var, &files.exp] {
            if !input.is_file() {
                tracing::error!(model = %name, file = %input.display(), "Missing logic file");
                return run.finish(RunStatus::MissingFile);
            }
        }

        let order = match self.toolchain.order_stage(files).run() {
            StageOutcome::Completed(report) => {
                run.order_time = Some(report.elapsed);
                files.order_path()
            }
            outcome => return self.stage_failed(run, outcome),
        };

        run.enter(Stage::Build);
        if let Err(e) = fs::create_dir_all(bdd_dir) {
            tracing::error!(
                model = %name,
                dir = %bdd_dir.display(),
                error = %e,
                "Cannot create BDD directory"
            );
            return run.finish(RunStatus::BuildError);
        }
        let artifact = bdd_dir.join(format!("{}.dddmp", name));
        match self.toolchain.build_stage(files, &order, &artifact).run() {
            StageOutcome::Completed(report) => run.build_time = Some(report.elapsed),
            outcome => return self.stage_failed(run, outcome),
        }

        run.enter(Stage::Analyze);
        if !artifact.is_file() {
            tracing::error!(model = %name, file = %artifact.display(), "BDD artifact disappeared");
            return run.finish(RunStatus::MissingFile);
        }
        let analysis = read_node_count(&artifact).and_then(|nodes| {
            run.bdd_nodes = Some(nodes);
            self.toolchain.count_configurations(&artifact)
        });
        match analysis {
            Ok(count) => {
                tracing::debug!(model = %name, configurations = %count, "Counted configurations");
                run.configurations = Some(count);
                run.finish(RunStatus::Success)
            }
            Err(e) => {
                tracing::error!(model = %name, error = %e, "Analysis failed");
                run.finish(RunStatus::AnalysisError)
            }
        }
    }

    fn stage_failed(&self, run: PipelineRun, outcome: StageOutcome) -> FinishedRun {
        let stage = run.stage();
        let status = match (&outcome, stage) {
            (StageOutcome::TimedOut { .. }, Stage::Order) => RunStatus::OrderTimeout,
            (StageOutcome::TimedOut { .. }, _) => RunStatus::BuildTimeout,
            (
                StageOutcome::Failed {
                    kind: FailureKind::MissingArtifact,
                    ..
                },
                _,
            ) => RunStatus::MissingFile,
            (_, Stage::Order) => RunStatus::OrderError,
            _ => RunStatus::BuildError,
        };

        match &outcome {
            StageOutcome::Failed { diagnostic, .. } => {
                tracing::error!(model = %run.model, status = %status, %diagnostic, "Stage failed")
            }
            _ => tracing::error!(model = %run.model, status = %status, "Stage failed"),
        }
        run.finish(status)
    }

    /// Processes every model under `root` not yet in the ledger
    pub fn run_batch(&self, root: &Path, ledger: &mut ResultsLedger) -> Result<BatchSummary> {
        let models = discover_models(root, &self.extension)?;
        let total = models.len();
        let mut summary = BatchSummary {
            discovered: total,
            ..Default::default()
        };
        tracing::info!(root = %root.display(), models = total, "Starting batch");

        for (index, path) in models.iter().enumerate() {
            let name = stem(path);
            let position = index + 1;
            tracing::info!(
                model = %name,
                progress = %format!("{}/{}", position, total),
                percent = %format!("{:.1}", position as f64 * 100.0 / total as f64),
                "Processing model"
            );

            if ledger.exists(&name) {
                tracing::info!(model = %name, "Already recorded, skipping");
                summary.skipped += 1;
                continue;
            }

            let finished = self.process_model(path);
            ledger.append(&finished.to_ledger_row(self.precision))?;
            tracing::info!(model = %name, status = %finished.status, "Recorded");
            summary.record(finished.status);
        }

        Ok(summary)
    }

    /// Build mode over a directory of logic files; nothing is recorded
    pub fn build_batch(&self, root: &Path) -> Result<(BatchSummary, Vec<FinishedRun>)> {
        let pairs = discover_logic(root)?;
        let mut summary = BatchSummary {
            discovered: pairs.len(),
            ..Default::default()
        };
        let mut runs = Vec::with_capacity(pairs.len());

        for (index, files) in pairs.iter().enumerate() {
            tracing::info!(
                model = %files.stem(),
                progress = %format!("{}/{}", index + 1, pairs.len()),
                "Building"
            );
            let finished = self.build_logic(files);
            summary.record(finished.status);
            runs.push(finished);
        }

        Ok((summary, runs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{UvlError, UvlReader};
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.tools.orderer = "/nonexistent/orderer".to_string();
        config
    }

    #[test]
    fn discovery_is_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        fs::write(dir.path().join("b/nested/z.uvl"), "").unwrap();
        fs::write(dir.path().join("a.uvl"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let found = discover_models(dir.path(), "uvl").unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.uvl"), dir.path().join("b/nested/z.uvl")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn discovery_ignores_symlink_loops() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/m.uvl"), "").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("a/loop")).unwrap();

        let found = discover_models(dir.path(), "uvl").unwrap();
        assert_eq!(found, vec![dir.path().join("a/m.uvl")]);
    }

    #[cfg(unix)]
    #[test]
    fn stale_order_output_is_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.uvl");
        fs::write(&path, "features\n    Root\n").unwrap();
        fs::write(dir.path().join("m-sifting.var"), "Root").unwrap();

        let mut config = config();
        config.tools.orderer = "true".to_string();
        let finished = PipelineOrchestrator::from_config(&config).process_model(&path);

        assert_eq!(finished.status, RunStatus::MissingFile);
        assert_eq!(finished.failed_stage, Some(Stage::Order));
        assert!(finished.run.order_time.is_none());
    }

    #[test]
    fn discovery_of_missing_root_fails() {
        assert!(discover_models(Path::new("/nonexistent/models"), "uvl").is_err());
    }

    #[test]
    fn logic_discovery_skips_order_outputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.var"), "A").unwrap();
        fs::write(dir.path().join("m-sifting.var"), "A").unwrap();

        let pairs = discover_logic(dir.path()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].exp, dir.path().join("m.exp"));
    }

    #[test]
    fn syntax_error_recorded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.uvl");
        fs::write(&path, "features\n    Root\n        wrongkeyword\n").unwrap();

        let orchestrator = PipelineOrchestrator::from_config(&config());
        let finished = orchestrator.process_model(&path);
        assert_eq!(finished.status, RunStatus::SyntaxError);
        assert_eq!(finished.failed_stage, Some(Stage::Parse));
    }

    #[test]
    fn spawn_failure_is_order_error_after_compile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.uvl");
        fs::write(&path, "features\n    Root\n        mandatory\n            A\n").unwrap();

        let orchestrator = PipelineOrchestrator::from_config(&config());
        let finished = orchestrator.process_model(&path);

        assert_eq!(finished.status, RunStatus::OrderError);
        assert_eq!(finished.run.variables, Some(2));
        assert_eq!(finished.run.clauses, Some(2));
        assert!(dir.path().join("tiny.var").exists());
        assert!(dir.path().join("tiny.exp").exists());
    }

    #[test]
    fn logic_dir_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.uvl");
        fs::write(&path, "features\n    Root\n").unwrap();

        let mut config = config();
        config.pipeline.logic_dir = Some(dir.path().join("logic"));
        let finished = PipelineOrchestrator::from_config(&config).process_model(&path);

        assert_eq!(finished.status, RunStatus::OrderError);
        assert!(dir.path().join("logic/tiny.var").exists());
    }

    #[test]
    fn build_without_expressions_is_missing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.var"), "A").unwrap();

        let orchestrator = PipelineOrchestrator::from_config(&config());
        let (summary, runs) = orchestrator.build_batch(dir.path()).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed.get(&RunStatus::MissingFile), Some(&1));
        assert_eq!(runs[0].failed_stage, Some(Stage::Order));
    }

    struct Unreadable;

    impl ModelReader for Unreadable {
        fn read(&self, _path: &Path) -> std::result::Result<FeatureModel, UvlError> {
            Err(UvlError {
                line: 0,
                message: "unsupported".to_string(),
            })
        }
    }

    #[test]
    fn batch_records_and_resumes() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models");
        fs::create_dir_all(&models).unwrap();
        fs::write(models.join("a.uvl"), "").unwrap();
        fs::write(models.join("b.uvl"), "").unwrap();

        let ledger_path = dir.path().join("results.csv");
        let orchestrator = PipelineOrchestrator::new(Unreadable, &config());

        let mut ledger = ResultsLedger::open(&ledger_path).unwrap();
        let summary = orchestrator.run_batch(&models, &mut ledger).unwrap();
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed_total(), 2);
        assert_eq!(summary.failed.get(&RunStatus::SyntaxError), Some(&2));

        let mut ledger = ResultsLedger::open(&ledger_path).unwrap();
        let summary = orchestrator.run_batch(&models, &mut ledger).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.processed, 0);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn uvl_reader_is_default() {
        let _: PipelineOrchestrator = PipelineOrchestrator::new(UvlReader, &config());
    }

    #[test]
    fn summary_serializes_status_keys() {
        let mut summary = BatchSummary::default();
        summary.record(RunStatus::Success);
        summary.record(RunStatus::OrderTimeout);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"]["OrderTimeout"], 1);
    }
}
