//! Shared helpers for the behavioural suites.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ortho_config::{OrthoConfig, OrthoError};
use serde_json::Value;
use tempfile::TempDir;

use mockupcryptd_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Loader that places the daemon socket in a private temporary directory.
#[derive(Clone)]
pub struct TestConfigLoader {
    dir: Arc<TempDir>,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self { dir: Arc::new(dir) }
    }

    pub fn runtime_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join("mongocryptd.sock")
    }

    pub fn endpoint(&self) -> SocketEndpoint {
        let path = self.socket_path();
        SocketEndpoint::unix(path.to_str().expect("temporary socket path was not valid UTF-8"))
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: self.endpoint(),
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unsupported socket scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("mockupcryptd"),
            OsString::from("--daemon-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    false
}

/// Line-oriented client for a Unix socket endpoint.
#[cfg(unix)]
pub struct SocketClient {
    reader: BufReader<std::os::unix::net::UnixStream>,
    writer: std::os::unix::net::UnixStream,
}

#[cfg(unix)]
impl SocketClient {
    pub fn connect(path: &Path) -> Self {
        let writer = std::os::unix::net::UnixStream::connect(path).expect("connect to daemon");
        writer
            .set_read_timeout(Some(WAIT_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(writer.try_clone().expect("clone stream"));
        Self { reader, writer }
    }

    pub fn send(&mut self, request: &Value) {
        let mut line = serde_json::to_vec(request).expect("serialise request");
        line.push(b'\n');
        self.writer.write_all(&line).expect("write request");
        self.writer.flush().expect("flush request");
    }

    pub fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .expect("write raw request");
        self.writer.flush().expect("flush request");
    }

    pub fn receive(&mut self) -> Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response");
        serde_json::from_str(&line).expect("response is JSON")
    }
}
