//! Utility functions for the command line front end

use crate::args::Args;
use bellesub::BellesubError;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use structopt::StructOpt;

/// Log to stderr at `info` unless `RUST_LOG` says otherwise
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();
}

pub fn print_help() -> io::Result<()> {
    let mut stderr = io::stderr();
    Args::clap()
        .write_help(&mut stderr)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    writeln!(stderr)
}

/// Ask the operator whether a non-empty output dir should be cleared.
///
/// Fails when stdin is not a terminal, since nobody can answer the question there.
pub fn confirm_clear(path: &Path) -> Result<bool, BellesubError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(BellesubError::Validation(format!(
            "Path {} not empty and stdin is not interactive, pass --clear or --no-clear",
            path.display()
        )));
    }

    println!("Path {} not empty", path.display());
    print!("Clear the path or not? [y/n] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    if stdin.lock().read_line(&mut answer)? == 0 {
        return Err(BellesubError::Validation(
            "No answer given, pass --clear or --no-clear".to_string(),
        ));
    }
    Ok(answer.trim().to_lowercase().starts_with('y'))
}
