//! Single-instance guard: a pid file held under an exclusive `flock`.
//!
//! Ownership is the advisory lock, not the file's existence. A file left by
//! a crashed daemon is unlocked and simply reused. A locked file whose pid
//! cannot be read yet belongs to a launcher that is still starting, so it is
//! reported as busy rather than replaced. The lock travels with the open file
//! description and therefore survives the fork performed when detaching.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, info, warn};

use mockupcryptd_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Passes tolerated when the pid file is unlinked between open and lock.
const LOCK_ATTEMPTS: usize = 3;

/// Exclusive ownership of the runtime directory's pid lock. Dropping the
/// guard deletes the file and then releases the lock.
#[derive(Debug)]
pub struct InstanceGuard {
    paths: RuntimePaths,
    lock: Flock<File>,
}

impl InstanceGuard {
    /// Locks the pid file and records the calling process as its owner.
    ///
    /// # Errors
    ///
    /// [`LaunchError::AlreadyRunning`] when another process holds the lock
    /// and has recorded its pid, [`LaunchError::LockBusy`] when the holder
    /// has not recorded one yet, and an IO-flavoured [`LaunchError`] when the
    /// file cannot be opened, locked or written.
    pub fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let path = paths.pid_lock_path().to_path_buf();
        for attempt in 1..=LOCK_ATTEMPTS {
            let Some(lock) = try_lock(&path)? else {
                return Err(holder_of(&path));
            };
            if refers_to(&lock, &path)? {
                let mut guard = Self { paths, lock };
                guard.record_pid(std::process::id())?;
                info!(
                    target: PROCESS_TARGET,
                    file = %path.display(),
                    "acquired instance lock"
                );
                return Ok(guard);
            }
            debug!(
                target: PROCESS_TARGET,
                attempt,
                "pid file replaced while locking; retrying"
            );
        }
        Err(LaunchError::LockBusy { path })
    }

    /// Overwrites the recorded pid, e.g. after detaching changed it.
    ///
    /// The new pid is written before the tail is cut, so concurrent readers
    /// always find a complete pid on the first line.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::PidWrite`] when the file cannot be updated.
    pub fn record_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let line = format!("{pid}\n");
        let file: &File = &self.lock;
        write_at_start(file, line.as_bytes())
            .and_then(|()| file.set_len(line.len() as u64))
            .and_then(|()| file.sync_data())
            .map_err(|source| LaunchError::PidWrite {
                path: self.paths.pid_lock_path().to_path_buf(),
                source,
            })?;
        debug!(target: PROCESS_TARGET, pid, "pid recorded");
        Ok(())
    }

    /// Files belonging to this instance.
    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let path = self.paths.pid_lock_path();
        if let Err(error) = fs::remove_file(path)
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: PROCESS_TARGET,
                file = %path.display(),
                %error,
                "failed to remove pid file"
            );
        }
    }
}

/// Opens the pid file and takes the lock without blocking. `None` means
/// another process holds it.
fn try_lock(path: &Path) -> Result<Option<Flock<File>>, LaunchError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    options.mode(0o600);
    let file = options.open(path).map_err(|source| LaunchError::LockOpen {
        path: path.to_path_buf(),
        source,
    })?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(Some(lock)),
        Err((_, Errno::EWOULDBLOCK)) => Ok(None),
        Err((_, source)) => Err(LaunchError::LockAcquire {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// A previous owner may have unlinked the file between our open and lock;
/// in that case the lock guards nothing.
fn refers_to(lock: &File, path: &Path) -> Result<bool, LaunchError> {
    let lock_error = |source| LaunchError::LockOpen {
        path: path.to_path_buf(),
        source,
    };
    let held = lock.metadata().map_err(lock_error)?;
    match fs::metadata(path) {
        Ok(current) => Ok(same_file(&held, &current)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(lock_error(source)),
    }
}

fn same_file(left: &fs::Metadata, right: &fs::Metadata) -> bool {
    left.dev() == right.dev() && left.ino() == right.ino()
}

fn write_at_start(file: &File, bytes: &[u8]) -> io::Result<()> {
    file.write_all_at(bytes, 0)
}

fn holder_of(path: &Path) -> LaunchError {
    match read_recorded_pid(path) {
        Some(pid) => {
            info!(
                target: PROCESS_TARGET,
                pid,
                "refusing to start: existing instance alive"
            );
            LaunchError::AlreadyRunning { pid }
        }
        None => LaunchError::LockBusy {
            path: path.to_path_buf(),
        },
    }
}

fn read_recorded_pid(path: &Path) -> Option<u32> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    contents.lines().next()?.trim().parse().ok()
}
