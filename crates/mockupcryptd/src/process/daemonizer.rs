//! Detaches the daemon from its controlling terminal.

use std::ffi::OsStr;
use std::fs::File;

use daemonize_me::Daemon;
use thiserror::Error;
use tracing::info;

use mockupcryptd_config::RuntimePaths;

use super::PROCESS_TARGET;

/// Abstraction over daemonisation strategies.
pub trait Daemonizer: Send + Sync {
    /// Detaches the process into the background. `log` receives the detached
    /// process's stdout and stderr.
    fn daemonize(&self, paths: &RuntimePaths, log: File) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
    /// The log file handle could not be duplicated for stderr.
    #[error("failed to duplicate log file handle: {0}")]
    LogHandle(#[source] std::io::Error),
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDaemonizer;

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, paths: &RuntimePaths, log: File) -> Result<(), DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            runtime = %paths.dir().display(),
            log = %paths.log_path().display(),
            "daemonising into background"
        );
        let stderr = log.try_clone().map_err(DaemonizeError::LogHandle)?;
        Daemon::new()
            .work_dir(paths.dir())
            .name(OsStr::new(env!("CARGO_PKG_NAME")))
            .stdout(log)
            .stderr(stderr)
            .start()?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "daemon process detached"
        );
        Ok(())
    }
}
