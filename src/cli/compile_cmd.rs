//! `compile`: models to logic files

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::output::Output;
use crate::pipeline::{compile_to_files, discover_models};
use crate::storage::{Config, UvlReader};

#[derive(Debug, Serialize)]
struct Compiled {
    model: String,
    features: usize,
    constraints: usize,
    skipped_constraints: usize,
    variables: usize,
    clauses: usize,
    var: PathBuf,
    exp: PathBuf,
    mapping: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Failure {
    model: String,
    error: String,
}

pub fn run(output: &Output, config: Config, path: &Path, out: Option<PathBuf>) -> Result<()> {
    let models = discover_models(path, &config.pipeline.extension)?;
    let out_dir = out.or(config.pipeline.logic_dir);
    output.verbose_ctx("compile", &format!("{} model(s) under {}", models.len(), path.display()));

    let mut compiled = Vec::new();
    let mut failures = Vec::new();
    for model_path in &models {
        match compile_one(model_path, out_dir.as_deref()) {
            Ok(result) => compiled.push(result),
            Err(e) => {
                let model = model_path.display().to_string();
                output.warn(&model, &format!("{:#}", e));
                failures.push(Failure {
                    model,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "compiled": compiled,
            "failed": failures,
        }));
    } else {
        output.row(&["MODEL", "FEATURES", "CONSTRAINTS", "VARIABLES", "CLAUSES", "MAPPING"]);
        for c in &compiled {
            let mapping = if c.mapping.is_some() { "yes" } else { "no" };
            output.row(&[
                c.model.as_str(),
                c.features.to_string().as_str(),
                c.constraints.to_string().as_str(),
                c.variables.to_string().as_str(),
                c.clauses.to_string().as_str(),
                mapping,
            ]);
        }
        output.blank();
        output.success(&format!(
            "Compiled {} of {} model(s)",
            compiled.len(),
            models.len()
        ));
    }

    if !failures.is_empty() {
        anyhow::bail!("{} model(s) failed to compile", failures.len());
    }
    Ok(())
}

fn compile_one(path: &Path, out_dir: Option<&Path>) -> Result<Compiled> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read model: {}", path.display()))?;
    let document = UvlReader::new().parse(&source)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = out_dir.unwrap_or_else(|| path.parent().unwrap_or(Path::new(".")));
    let logic = compile_to_files(&document.model, dir, &name)?;

    Ok(Compiled {
        model: name,
        features: document.model.feature_count(),
        constraints: document.model.constraint_count(),
        skipped_constraints: document.skipped_constraints,
        variables: logic.variables,
        clauses: logic.clauses,
        var: logic.files.var,
        exp: logic.files.exp,
        mapping: logic.files.mapping,
    })
}
