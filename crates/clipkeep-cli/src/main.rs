//! Command-line client for the clipkeep clipboard history server.
//!
//! The binary delegates to [`clipkeep_cli::run`], which loads configuration,
//! prepares command arguments, sends one JSONL request to `clipkeepd` and
//! forwards the streamed response.

use std::io::{self, StderrLock, StdinLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdin: StdinLock<'_> = io::stdin().lock();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    clipkeep_cli::run(std::env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}
