//! Unified error surface for daemon launch.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use mockupcryptd_config::RuntimePathsError;

use crate::bootstrap::BootstrapError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;
use super::shutdown::ShutdownError;

/// Errors surfaced while launching the daemon. All of them are fatal before
/// the dispatch loop starts.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration, telemetry or socket preparation failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Runtime artefact paths could not be resolved.
    #[error("failed to resolve runtime paths: {source}")]
    RuntimePaths {
        /// Underlying path error.
        #[source]
        source: RuntimePathsError,
    },
    /// The pid file could not be opened or inspected.
    #[error("failed to open pid file '{path}': {source}")]
    LockOpen {
        /// Pid file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// `flock` failed for a reason other than contention.
    #[error("failed to lock pid file '{path}': {source}")]
    LockAcquire {
        /// Pid file path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// Another instance holds the lock.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded by the running instance.
        pid: u32,
    },
    /// Another launcher holds the lock but has not recorded its pid yet.
    #[error("another instance is starting and holds '{path}'")]
    LockBusy {
        /// Pid file path.
        path: PathBuf,
    },
    /// Writing the pid failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// Pid file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Opening the daemon log file failed.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[source]
        source: DaemonizeError,
    },
    /// Installing the interrupt handlers failed.
    #[error("failed to install interrupt handling: {source}")]
    Interrupt {
        /// Underlying signal error.
        #[source]
        source: ShutdownError,
    },
    /// The socket could not be bound.
    #[error("daemon socket listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<RuntimePathsError> for LaunchError {
    fn from(source: RuntimePathsError) -> Self {
        Self::RuntimePaths { source }
    }
}

impl From<DaemonizeError> for LaunchError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Interrupt { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        Self::Listener { source }
    }
}
