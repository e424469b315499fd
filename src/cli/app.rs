//! Main CLI application structure

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{build_cmd, check, compile_cmd, run_cmd};
use crate::storage::{Config, LoggingConfig};

#[derive(Parser)]
#[command(name = "uvl2bdd")]
#[command(author, version, about = "Compile feature models to logic and build their BDDs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (replaces the project uvl2bdd.toml lookup)
    #[arg(long, global = true, env = "UVL2BDD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default uvl2bdd.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Compile models to .var/.exp logic files
    Compile {
        /// Model file or directory of models
        path: PathBuf,

        /// Output directory for logic files (default: next to each model)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Order, build and analyze existing logic files
    Build {
        /// A .var file or a directory of logic files
        #[arg(required_unless_present = "var", conflicts_with_all = ["var", "exp"])]
        path: Option<PathBuf>,

        /// Variables file
        #[arg(long, requires = "exp")]
        var: Option<PathBuf>,

        /// Expressions file
        #[arg(long, requires = "var")]
        exp: Option<PathBuf>,

        /// Output directory for BDD artifacts (default: next to the logic files)
        #[arg(long)]
        bdd_dir: Option<PathBuf>,

        /// Per-stage timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Run the full resumable pipeline and record results
    Run {
        /// Model file or directory of models
        path: PathBuf,

        /// Results ledger (CSV)
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Per-stage timeout in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Report unparseable and duplicate models
    Check {
        /// Directory of models
        dir: PathBuf,

        /// Copy valid, unique models into this directory
        #[arg(long)]
        copy_to: Option<PathBuf>,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(cli.format, cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.logging, cli.verbose)?;
    output.verbose_ctx("config", &format!("{:?}", config));

    match cli.command {
        Commands::Init { path } => {
            let written = Config::write_default(&path)?;
            if output.is_json() {
                output.data(&serde_json::json!({
                    "created": written.display().to_string(),
                }));
            } else {
                output.success(&format!("Created {}", written.display()));
            }
        }

        Commands::Compile { path, out } => compile_cmd::run(&output, config, &path, out)?,

        Commands::Build {
            path,
            var,
            exp,
            bdd_dir,
            timeout,
        } => {
            let target = match (path, var, exp) {
                (Some(path), _, _) => build_cmd::Target::Path(path),
                (None, Some(var), Some(exp)) => build_cmd::Target::Pair { var, exp },
                _ => anyhow::bail!("Either a path or both --var and --exp are required"),
            };
            build_cmd::run(&output, config, target, bdd_dir, timeout)?
        }

        Commands::Run {
            path,
            ledger,
            timeout,
        } => run_cmd::run(&output, config, &path, ledger, timeout)?,

        Commands::Check { dir, copy_to } => check::run(&output, &config, &dir, copy_to.as_deref())?,
    }

    Ok(())
}

/// Installs the global subscriber
///
/// The filter is `RUST_LOG` if set, else `debug` with `--verbose`, else the
/// configured level. Logs go to the configured file or to stderr.
fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new(&logging.level),
    };

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .try_init()
                .context("Failed to install logger")?;
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install logger")?;
        }
    }

    Ok(())
}
