//! A stand-in for the field-marking daemon that encryption-aware database
//! drivers spawn.
//!
//! The daemon listens on a local socket (by default `/tmp/mongocryptd.sock`),
//! reads JSON-line command requests and answers them one at a time:
//!
//! - `markFields` replaces the value of every `encryptMe` field in the
//!   supplied documents with an empty binary marker of subtype 7.
//! - `shutdown` stops the daemon without answering.
//!
//! Anything else is answered with an "unrecognized request" error. Driver
//! test suites point their auto-encryption settings at this binary instead
//! of the production daemon.
//!
//! The request loop lives in [`dispatch`]. The remaining modules supply the
//! collaborators around it: configuration bootstrap, structured
//! [`telemetry`], the socket transport and the process lifecycle (single
//! instance lock, optional daemonisation, interrupt handling).

mod bootstrap;
pub mod dispatch;
mod process;
pub mod telemetry;
mod transport;

use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::process::ExitCode;

pub use bootstrap::{BootstrapError, Bootstrapped, ConfigLoader, SystemConfigLoader, bootstrap_with};
pub use process::{
    DAEMONIZE_ENV_VAR, DAEMONIZE_FLAG, DaemonizeError, Daemonizer, InstanceGuard, LaunchError,
    LaunchMode, LaunchPlan, ShutdownError, ShutdownSignal, SystemDaemonizer, SystemShutdownSignal,
    run_daemon, run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ListenerError, SocketRequestSource};

/// Runs the daemon and maps the outcome to a process exit status.
///
/// Finding another live instance is not a failure: the existing pid is
/// printed to `stdout` and the exit status is success. With `--daemonize`,
/// `stdout` also receives the launcher's pid and the log file path before
/// the process detaches.
pub fn run<I, O, E>(args: I, stdout: &mut O, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    O: Write,
    E: Write,
{
    let outcome = run_daemon(args, stdout);
    report(outcome, stdout, stderr)
}

fn report<T, O, E>(outcome: Result<T, LaunchError>, stdout: &mut O, stderr: &mut E) -> ExitCode
where
    O: Write,
    E: Write,
{
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(LaunchError::AlreadyRunning { pid }) => {
            emit(stdout, format_args!("Daemon already running with PID={pid}"));
            ExitCode::SUCCESS
        }
        Err(error) => {
            emit(stderr, format_args!("mockupcryptd: {error}"));
            ExitCode::FAILURE
        }
    }
}

/// The exit status is already decided, so a closed stream only gets a log
/// line.
fn emit<W: Write>(out: &mut W, line: fmt::Arguments<'_>) {
    if let Err(error) = writeln!(out, "{line}") {
        tracing::debug!(%error, "failed to write exit report");
    }
}

#[cfg(test)]
mod tests;
