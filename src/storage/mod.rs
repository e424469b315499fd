//! # Storage Layer
//!
//! Everything uvl2bdd reads from or writes to disk.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Feature models | UVL | input directory, `*.uvl` |
//! | Logic files | plain text | `<logic_dir>/<model>.var`, `.exp`, `.securevars` |
//! | Results | CSV | `results.csv` (configurable) |
//! | Config | TOML | `uvl2bdd.toml` (project), `~/.config/uvl2bdd/config.toml` (global) |
//!
//! ## Concurrency Safety
//!
//! - [`ResultsLedger`] appends under an exclusive `fs2` lock and flushes each row
//! - Logic files are written once per model and never shared
//!
//! ## Key Types
//!
//! - [`UvlReader`] - Parses UVL into a feature model via [`ModelReader`]
//! - [`LogicFiles`] - Writes and inspects `.var`/`.exp` pairs
//! - [`ResultsLedger`] - Append-only results with exact resume lookup
//! - [`Config`] - Layered project and global configuration

mod config;
mod ledger;
mod logic;
mod uvl;

pub use config::{
    Config, ConfigError, LedgerConfig, LoggingConfig, PipelineConfig, ToolsConfig, PROJECT_FILE,
};
pub use ledger::{
    float2exp, format_count, int2sci, Cell, LedgerError, LedgerRow, ResultsLedger, HEADER,
};
pub use logic::LogicFiles;
pub use uvl::{ModelReader, UvlDocument, UvlError, UvlReader};
