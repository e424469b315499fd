//! # Command-Line Interface
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init` | write a default `uvl2bdd.toml` |
//! | `compile` | models to `.var`/`.exp` logic files |
//! | `build` | order, build and analyze existing logic files |
//! | `run` | full pipeline over a collection, recorded in the ledger |
//! | `check` | report unparseable and duplicate models |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Logs go to stderr (or the configured log file) and are filtered by
//! `RUST_LOG`, `--verbose` or `logging.level`, in that order.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod build_cmd;
mod check;
mod compile_cmd;
mod output;
mod run_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
