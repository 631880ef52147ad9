//! Where the daemon keeps its pid lock and detached log.
//!
//! Both files sit beside a Unix socket, so daemons serving different socket
//! paths never contend. TCP endpoints fall back to a per-user runtime
//! directory and carry the port in the file stem.

use std::env;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Config, SocketEndpoint};

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

const FILE_STEM: &str = "mockupcryptd";

/// Files owned by one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    dir: PathBuf,
    pid_lock: PathBuf,
    log: PathBuf,
}

impl RuntimePaths {
    /// Resolves the files for the configured socket. See
    /// [`for_endpoint`](Self::for_endpoint).
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        Self::for_endpoint(config.daemon_socket())
    }

    /// Resolves the files for `endpoint`, creating their directory (mode 0700
    /// on Unix) when missing.
    pub fn for_endpoint(endpoint: &SocketEndpoint) -> Result<Self, RuntimePathsError> {
        let (dir, stem) = match endpoint {
            SocketEndpoint::Unix { path } => {
                let parent = path
                    .parent()
                    .filter(|parent| !parent.as_str().is_empty())
                    .ok_or_else(|| RuntimePathsError::MissingSocketParent {
                        path: path.to_string(),
                    })?;
                (parent.as_std_path().to_path_buf(), FILE_STEM.to_owned())
            }
            SocketEndpoint::Tcp { port, .. } => (user_runtime_dir(), format!("{FILE_STEM}-{port}")),
        };
        private_dir_builder()
            .create(&dir)
            .map_err(|source| RuntimePathsError::RuntimeDirectory {
                path: dir.clone(),
                source,
            })?;
        Ok(Self {
            pid_lock: dir.join(format!("{stem}.pid")),
            log: dir.join(format!("{stem}.log")),
            dir,
        })
    }

    /// Directory holding the instance files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the owner's pid. The owner keeps an exclusive advisory
    /// lock on it for as long as it runs.
    #[must_use]
    pub fn pid_lock_path(&self) -> &Path {
        &self.pid_lock
    }

    /// File receiving stdout and stderr once the daemon detaches.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log
    }

    /// Opens the detached log, replacing output from any earlier run.
    pub fn open_log(&self) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(&self.log)
    }
}

fn private_dir_builder() -> DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
}

fn user_runtime_dir() -> PathBuf {
    #[cfg(unix)]
    {
        match runtime_dir() {
            Some(dir) => dir.join(FILE_STEM),
            // SAFETY: geteuid has no preconditions and cannot fail.
            None => env::temp_dir()
                .join(FILE_STEM)
                .join(format!("uid-{}", unsafe { geteuid() })),
        }
    }

    #[cfg(not(unix))]
    {
        env::temp_dir().join(FILE_STEM)
    }
}

/// Errors raised while resolving the instance files.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// A relative socket name such as `mongocryptd.sock` has nowhere to keep
    /// its pid lock.
    #[error("socket path '{path}' has no parent directory")]
    MissingSocketParent { path: String },
    /// The directory could not be created.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
