//! Launch sequencing around the dispatch loop.

use std::env;
use std::ffi::OsString;
use std::io::{self, Write};

use tracing::{info, warn};

use mockupcryptd_config::RuntimePaths;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::{CancellationToken, CommandRegistry, Dispatcher, LoopExit};
use crate::transport::SocketRequestSource;

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::InstanceGuard;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{DAEMONIZE_ENV_VAR, DAEMONIZE_FLAG, PROCESS_TARGET};

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Stay attached to the terminal.
    Foreground,
    /// Detach and send output to the runtime log file.
    Daemon,
}

impl LaunchMode {
    /// Picks the mode from the command line and environment.
    ///
    /// [`DAEMONIZE_FLAG`] is removed from the returned arguments so the
    /// configuration parser never sees it.
    pub fn from_args<I>(args: I) -> (Self, Vec<OsString>)
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut daemonize = env::var_os(DAEMONIZE_ENV_VAR).is_some();
        let remaining = args
            .into_iter()
            .filter(|arg| {
                let flagged = arg == DAEMONIZE_FLAG;
                daemonize |= flagged;
                !flagged
            })
            .collect();
        let mode = if daemonize { Self::Daemon } else { Self::Foreground };
        (mode, remaining)
    }
}

/// Collaborators required to launch the daemon.
pub struct LaunchPlan<L, D, S> {
    /// Foreground or detached.
    pub mode: LaunchMode,
    /// Configuration source.
    pub loader: L,
    /// Detaches the process in [`LaunchMode::Daemon`].
    pub daemonizer: D,
    /// Interrupt source wired to the loop's cancellation token.
    pub shutdown: S,
    /// Commands served by the loop.
    pub registry: CommandRegistry,
}

/// Runs the daemon with the production collaborators.
///
/// `args` is the full command line, program name first. `stdout` receives
/// the notice printed before detaching.
///
/// # Errors
///
/// Returns a [`LaunchError`] when any startup step fails; see
/// [`run_daemon_with`].
pub fn run_daemon<I, O>(args: I, stdout: &mut O) -> Result<LoopExit, LaunchError>
where
    I: IntoIterator<Item = OsString>,
    O: Write,
{
    let (mode, args) = LaunchMode::from_args(args);
    let plan = LaunchPlan {
        mode,
        loader: SystemConfigLoader::new(args),
        daemonizer: SystemDaemonizer,
        shutdown: SystemShutdownSignal,
        registry: CommandRegistry::standard(),
    };
    run_daemon_with(plan, stdout)
}

/// Runs the daemon with injected collaborators until the loop stops.
///
/// In [`LaunchMode::Daemon`] the launcher tells `stdout` that it is going to
/// the background, under which pid, and where the log goes.
///
/// # Errors
///
/// Every step before the loop starts is fatal: configuration, telemetry,
/// runtime paths, the instance lock ([`LaunchError::AlreadyRunning`] when
/// another instance is alive), the log file, daemonisation, binding the
/// socket and installing interrupt handlers.
pub fn run_daemon_with<L, D, S, O>(
    plan: LaunchPlan<L, D, S>,
    stdout: &mut O,
) -> Result<LoopExit, LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
    S: ShutdownSignal,
    O: Write,
{
    let LaunchPlan {
        mode,
        loader,
        daemonizer,
        shutdown,
        registry,
    } = plan;

    let bootstrapped = bootstrap_with(&loader)?;
    let config = bootstrapped.config();
    info!(target: PROCESS_TARGET, ?mode, "starting mockupcryptd");

    let paths = RuntimePaths::from_config(config)?;
    let mut guard = InstanceGuard::acquire(paths)?;
    if mode == LaunchMode::Daemon {
        let paths = guard.paths();
        let log = paths.open_log().map_err(|source| LaunchError::LogFile {
            path: paths.log_path().to_path_buf(),
            source,
        })?;
        if let Err(error) = announce_detach(stdout, paths) {
            warn!(target: PROCESS_TARGET, %error, "failed to print background notice");
        }
        daemonizer.daemonize(paths, log)?;
        guard.record_pid(std::process::id())?;
    }

    let mut source = SocketRequestSource::bind(config.daemon_socket())?;
    let cancel = CancellationToken::new();
    shutdown.install(&cancel)?;

    let exit = Dispatcher::new(registry).run(&mut source, &cancel);
    info!(target: PROCESS_TARGET, ?exit, "mockupcryptd stopped");
    drop(guard);
    Ok(exit)
}

fn announce_detach<O: Write>(stdout: &mut O, paths: &RuntimePaths) -> io::Result<()> {
    writeln!(stdout, "Running as a background process")?;
    writeln!(stdout, "PID={}", std::process::id())?;
    writeln!(stdout, "Logging to {}", paths.log_path().display())?;
    stdout.flush()
}
