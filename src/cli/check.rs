//! `check`: sort a model collection into usable and unusable files
//!
//! A model is rejected when it does not parse, when an earlier model has the
//! same stem (the ledger keys on it), or when an earlier model has identical
//! content.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::output::Output;
use crate::pipeline::discover_models;
use crate::storage::{Config, UvlReader};

#[derive(Debug, Serialize)]
struct Rejected {
    path: PathBuf,
    reason: String,
}

#[derive(Debug, Default, Serialize)]
struct CheckReport {
    valid: Vec<PathBuf>,
    syntax_errors: Vec<Rejected>,
    duplicate_names: Vec<Rejected>,
    duplicate_content: Vec<Rejected>,
    /// Valid models with features the root cannot reach
    detached: Vec<Rejected>,
    copied: usize,
}

pub fn run(output: &Output, config: &Config, dir: &Path, copy_to: Option<&Path>) -> Result<()> {
    let models = discover_models(dir, &config.pipeline.extension)?;
    let reader = UvlReader::new();
    let mut report = CheckReport::default();
    let mut stems: HashMap<String, PathBuf> = HashMap::new();
    let mut hashes: HashMap<blake3::Hash, PathBuf> = HashMap::new();

    for path in models {
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read model: {}", path.display()))?;

        let document = match std::str::from_utf8(&bytes) {
            Ok(source) => reader.parse(source).map_err(|e| e.to_string()),
            Err(e) => Err(format!("not UTF-8: {}", e)),
        };
        let document = match document {
            Ok(document) => document,
            Err(reason) => {
                output.verbose_ctx("check", &format!("{}: {}", path.display(), reason));
                report.syntax_errors.push(Rejected { path, reason });
                continue;
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(first) = stems.get(&stem) {
            let reason = format!("same name as {}", first.display());
            report.duplicate_names.push(Rejected { path, reason });
            continue;
        }

        let hash = blake3::hash(&bytes);
        if let Some(first) = hashes.get(&hash) {
            let reason = format!("same content as {}", first.display());
            report.duplicate_content.push(Rejected { path, reason });
            continue;
        }

        let detached = document.model.detached_features();
        if !detached.is_empty() {
            let names: Vec<&str> = detached.iter().map(|f| f.name.as_str()).collect();
            report.detached.push(Rejected {
                path: path.clone(),
                reason: format!("unreachable from root: {}", names.join(", ")),
            });
        }

        stems.insert(stem, path.clone());
        hashes.insert(hash, path.clone());
        report.valid.push(path);
    }

    if let Some(target) = copy_to {
        fs::create_dir_all(target)
            .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        for path in &report.valid {
            if let Some(name) = path.file_name() {
                let dest = target.join(name);
                fs::copy(path, &dest).with_context(|| {
                    format!("Failed to copy {} to {}", path.display(), dest.display())
                })?;
                report.copied += 1;
            }
        }
    }

    if output.is_json() {
        output.data(&report);
        return Ok(());
    }

    for (label, rejected) in [
        ("syntax error", &report.syntax_errors),
        ("duplicate name", &report.duplicate_names),
        ("duplicate content", &report.duplicate_content),
        ("detached features", &report.detached),
    ] {
        for r in rejected {
            output.row(&[label, r.path.display().to_string().as_str(), r.reason.as_str()]);
        }
    }
    output.blank();
    output.success(&format!(
        "{} valid, {} syntax error(s), {} duplicate name(s), {} duplicate content",
        report.valid.len(),
        report.syntax_errors.len(),
        report.duplicate_names.len(),
        report.duplicate_content.len()
    ));
    if let Some(target) = copy_to {
        output.success(&format!("Copied {} model(s) to {}", report.copied, target.display()));
    }

    Ok(())
}
