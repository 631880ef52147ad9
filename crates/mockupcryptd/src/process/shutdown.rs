//! Turns operator interrupts into a cancellation of the dispatch loop.

use std::io;
use std::sync::Arc;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use thiserror::Error;
use tracing::debug;

use crate::dispatch::CancellationToken;

use super::PROCESS_TARGET;

/// Signals that stop the daemon.
pub const INTERRUPT_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Exit status used when a second interrupt arrives before the loop stopped.
const FORCED_EXIT_STATUS: i32 = 1;

/// Abstraction over interrupt sources.
pub trait ShutdownSignal: Send + Sync {
    /// Arranges for `token` to be cancelled when an interrupt arrives.
    fn install(&self, token: &CancellationToken) -> Result<(), ShutdownError>;
}

/// Errors reported while installing interrupt handlers.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering a signal handler failed.
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        /// Signal number.
        signal: i32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Cancels the token on SIGTERM, SIGINT, SIGQUIT or SIGHUP. A second signal
/// while the token is already cancelled exits the process immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn install(&self, token: &CancellationToken) -> Result<(), ShutdownError> {
        let cancelled = token.flag();
        for signal in INTERRUPT_SIGNALS {
            let install_error = |source| ShutdownError::Install { signal, source };
            // The conditional exit must be registered first so the first
            // signal only sets the flag.
            flag::register_conditional_shutdown(
                signal,
                FORCED_EXIT_STATUS,
                Arc::clone(&cancelled),
            )
            .map_err(install_error)?;
            flag::register(signal, Arc::clone(&cancelled)).map_err(install_error)?;
        }
        debug!(
            target: PROCESS_TARGET,
            signals = ?INTERRUPT_SIGNALS,
            "interrupt handlers installed"
        );
        Ok(())
    }
}
