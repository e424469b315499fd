//! Logic files consumed by the BDD toolchain
//!
//! | File | Content |
//! |------|---------|
//! | `<name>.var` | sanitized variable names, space separated |
//! | `<name>.exp` | one propositional formula per line |
//! | `<name>.securevars` | `original,sanitized` per line, only when names changed |
//! | `<name>-sifting.var` | variable order produced by the ordering tool |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::{Formula, NameMapping};

/// Paths of one model's logic files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicFiles {
    pub var: PathBuf,
    pub exp: PathBuf,
    /// Present only when sanitization renamed something
    pub mapping: Option<PathBuf>,
}

impl LogicFiles {
    /// Refers to an existing `.var`/`.exp` pair
    pub fn existing(var: impl Into<PathBuf>, exp: impl Into<PathBuf>) -> Self {
        Self {
            var: var.into(),
            exp: exp.into(),
            mapping: None,
        }
    }

    /// Writes the logic files for `name` into `dir`
    pub fn write(dir: &Path, name: &str, mapping: &NameMapping, formula: &Formula) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let var = dir.join(format!("{}.var", name));
        let exp = dir.join(format!("{}.exp", name));
        let mapping_path = dir.join(format!("{}.securevars", name));

        let variables = mapping.variables().collect::<Vec<_>>().join(" ");
        fs::write(&var, variables)
            .with_context(|| format!("Failed to write variables file: {}", var.display()))?;

        fs::write(&exp, formula.to_expressions())
            .with_context(|| format!("Failed to write expressions file: {}", exp.display()))?;

        let mapping = if mapping.is_identity() {
            if mapping_path.exists() {
                fs::remove_file(&mapping_path).with_context(|| {
                    format!("Failed to remove stale mapping: {}", mapping_path.display())
                })?;
            }
            None
        } else {
            let mut content = String::new();
            for (original, sanitized) in mapping.iter() {
                content.push_str(original);
                content.push(',');
                content.push_str(sanitized);
                content.push('\n');
            }
            fs::write(&mapping_path, content)
                .with_context(|| format!("Failed to write mapping: {}", mapping_path.display()))?;
            Some(mapping_path)
        };

        Ok(Self { var, exp, mapping })
    }

    /// Stem shared by the variables file and its derived artifacts
    pub fn stem(&self) -> String {
        self.var
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Output path of the ordering tool, next to the variables file
    pub fn order_path(&self) -> PathBuf {
        self.var.with_file_name(format!("{}-sifting.var", self.stem()))
    }

    /// Number of whitespace-separated names in the variables file
    pub fn count_variables(&self) -> Result<usize> {
        let content = fs::read_to_string(&self.var)
            .with_context(|| format!("Failed to read variables file: {}", self.var.display()))?;
        Ok(content.split_whitespace().count())
    }

    /// Number of lines in the expressions file
    pub fn count_clauses(&self) -> Result<usize> {
        let content = fs::read_to_string(&self.exp)
            .with_context(|| format!("Failed to read expressions file: {}", self.exp.display()))?;
        Ok(content.lines().count())
    }
}
