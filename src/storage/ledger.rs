//! Results ledger
//!
//! Per-model outcomes are appended to a CSV file, one row per model:
//!
//! | Column | Content |
//! |--------|---------|
//! | Model | file stem of the model |
//! | Features, Constraints | parse counts |
//! | UVL2Logic Time (s) | compile time |
//! | Variables, Clauses | logic file counts |
//! | fastOrder Time (s), Logic2BDD Time (s) | stage times |
//! | BDD Nodes, Configurations | analysis results |
//! | Status | terminal run status |
//!
//! A failed stage writes `Error` or `Timeout` in its own column and `-` in
//! every column of the stages that never ran. The ledger is also the resume
//! index: a model already present in the Model column is not processed again.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use num_bigint::BigUint;
use thiserror::Error;

/// Column names in file order
pub const HEADER: [&str; 11] = [
    "Model",
    "Features",
    "Constraints",
    "UVL2Logic Time (s)",
    "Variables",
    "Clauses",
    "fastOrder Time (s)",
    "Logic2BDD Time (s)",
    "BDD Nodes",
    "Configurations",
    "Status",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock ledger {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single ledger value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Value(String),
    Error,
    Timeout,
    /// The stage producing this value never ran
    NotRun,
}

impl Cell {
    pub fn value(v: impl ToString) -> Self {
        Cell::Value(v.to_string())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Value(v) => f.write_str(v),
            Cell::Error => f.write_str("Error"),
            Cell::Timeout => f.write_str("Timeout"),
            Cell::NotRun => f.write_str("-"),
        }
    }
}

/// One model's row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub model: String,
    pub features: Cell,
    pub constraints: Cell,
    pub compile_time: Cell,
    pub variables: Cell,
    pub clauses: Cell,
    pub order_time: Cell,
    pub build_time: Cell,
    pub bdd_nodes: Cell,
    pub configurations: Cell,
    pub status: String,
}

impl LedgerRow {
    /// A row where no stage has run yet
    pub fn new(model: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            features: Cell::NotRun,
            constraints: Cell::NotRun,
            compile_time: Cell::NotRun,
            variables: Cell::NotRun,
            clauses: Cell::NotRun,
            order_time: Cell::NotRun,
            build_time: Cell::NotRun,
            bdd_nodes: Cell::NotRun,
            configurations: Cell::NotRun,
            status: status.into(),
        }
    }

    /// Field values in [`HEADER`] order
    pub fn fields(&self) -> Vec<String> {
        vec![
            self.model.clone(),
            self.features.to_string(),
            self.constraints.to_string(),
            self.compile_time.to_string(),
            self.variables.to_string(),
            self.clauses.to_string(),
            self.order_time.to_string(),
            self.build_time.to_string(),
            self.bdd_nodes.to_string(),
            self.configurations.to_string(),
            self.status.clone(),
        ]
    }
}

/// Append-only CSV ledger with an exact-match resume index
pub struct ResultsLedger {
    path: PathBuf,
    recorded: HashSet<String>,
}

impl ResultsLedger {
    /// Opens a ledger, loading the model names it already records
    ///
    /// A missing file is an empty ledger; it is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let mut recorded = HashSet::new();

        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| LedgerError::Read {
                path: path.clone(),
                source,
            })?;

            for record in parse_records(&content).into_iter().skip(1) {
                if let Some(model) = record.into_iter().next() {
                    recorded.insert(model);
                }
            }
        }

        Ok(Self { path, recorded })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a row with exactly this model name exists
    pub fn exists(&self, model: &str) -> bool {
        self.recorded.contains(model)
    }

    /// Number of distinct models recorded
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Appends one row under an exclusive lock, writing the header first if
    /// the file is new or empty
    pub fn append(&mut self, row: &LedgerRow) -> Result<(), LedgerError> {
        let write_err = |source| LedgerError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;

        file.lock_exclusive().map_err(|source| LedgerError::Lock {
            path: self.path.clone(),
            source,
        })?;

        let is_empty = file.metadata().map_err(write_err)?.len() == 0;

        let mut writer = BufWriter::new(&file);
        if is_empty {
            writeln!(writer, "{}", to_record(HEADER.iter().copied())).map_err(write_err)?;
        }
        let fields = row.fields();
        writeln!(writer, "{}", to_record(fields.iter().map(String::as_str))).map_err(write_err)?;
        writer.flush().map_err(write_err)?;

        // Lock is released when file is dropped
        self.recorded.insert(row.model.clone());
        Ok(())
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn to_record<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    fields.map(quote).collect::<Vec<_>>().join(",")
}

/// Splits CSV content into records, honouring quoted fields
fn parse_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

/// Rounds to `precision` decimals; values that round to zero use exponential
/// notation instead
pub fn float2exp(value: f64, precision: usize) -> String {
    let scale = 10f64.powi(precision as i32);
    let rounded = (value * scale).round() / scale;

    if rounded == 0.0 {
        return exponential(value, precision);
    }

    let text = rounded.to_string();
    if text.contains('.') || !rounded.is_finite() {
        text
    } else {
        format!("{}.0", text)
    }
}

/// `{:.Ne}` with a signed, two-digit exponent (`1.2340e-05`)
fn exponential(value: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, value);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => raw,
    }
}

/// Scientific notation for large integers (`1.23e6`)
pub fn int2sci(n: &BigUint, precision: usize) -> String {
    let digits = n.to_string();
    if digits == "0" {
        return "0e0".to_string();
    }

    let exp = digits.len() - 1;
    // 17 significant digits are enough for an f64 mantissa
    let significant = &digits[..digits.len().min(17)];
    let mantissa: f64 = format!("{}.{}", &significant[..1], &significant[1..])
        .parse()
        .unwrap_or(0.0);

    format!("{:.*}e{}", precision, mantissa, exp)
}

/// Configuration count cell: plain up to one million, scientific above
pub fn format_count(n: &BigUint) -> String {
    if *n > BigUint::from(1_000_000u32) {
        int2sci(n, 2)
    } else {
        n.to_string()
    }
}
