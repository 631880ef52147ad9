//! Entry point for the `mockupcryptd` binary.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Unlocked handles: tracing writes to stderr from listener threads.
    mockupcryptd::run(std::env::args_os(), &mut io::stdout(), &mut io::stderr())
}
