//! uvl2bdd - feature models to BDDs

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = uvl2bdd::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
