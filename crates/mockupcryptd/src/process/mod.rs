//! Process lifecycle around the dispatch loop: launch modes, the
//! single-instance guard, daemonisation and interrupt wiring.

pub(crate) mod daemonizer;
mod errors;
pub(crate) mod guard;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use self::daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use self::errors::LaunchError;
pub use self::guard::InstanceGuard;
pub use self::launch::{LaunchMode, LaunchPlan, run_daemon, run_daemon_with};
pub use self::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Command-line switch selecting [`LaunchMode::Daemon`].
pub const DAEMONIZE_FLAG: &str = "--daemonize";

/// Environment variable selecting [`LaunchMode::Daemon`] when set.
pub const DAEMONIZE_ENV_VAR: &str = "MOCKUPCRYPTD_DAEMONIZE";
