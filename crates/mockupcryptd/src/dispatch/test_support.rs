//! In-memory request source and log capture for exercising the dispatch
//! loop.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::Level;

use mockupcryptd_config::SocketEndpoint;

use super::cancel::CancellationToken;
use super::errors::DispatchError;
use super::request::{CommandArguments, CommandRequest};
use super::response::CommandResponse;
use super::source::{InboundRequest, ReplySink, RequestSource};

/// Builds a request from a JSON object of arguments.
pub(crate) fn request(name: &str, arguments: Value) -> CommandRequest {
    let arguments = match arguments {
        Value::Object(map) => CommandArguments::from(map),
        other => panic!("arguments must be a JSON object, got {other}"),
    };
    CommandRequest::new(name, arguments)
}

type Replies = Arc<Mutex<Vec<CommandResponse>>>;

struct RecordingReply {
    replies: Replies,
}

impl ReplySink for RecordingReply {
    fn send(&mut self, response: &CommandResponse) -> Result<(), DispatchError> {
        self.replies
            .lock()
            .expect("reply log poisoned")
            .push(response.clone());
        Ok(())
    }
}

/// Replays a fixed list of requests, then closes or fires a cancellation.
pub(crate) struct ScriptedSource {
    endpoint: SocketEndpoint,
    queue: VecDeque<CommandRequest>,
    replies: Replies,
    stop_calls: usize,
    cancel_on_drain: Option<CancellationToken>,
}

impl ScriptedSource {
    pub(crate) fn new(requests: impl IntoIterator<Item = CommandRequest>) -> Self {
        Self {
            endpoint: SocketEndpoint::unix("/tmp/mockupcryptd-test.sock"),
            queue: requests.into_iter().collect(),
            replies: Arc::default(),
            stop_calls: 0,
            cancel_on_drain: None,
        }
    }

    /// Simulates an interrupt arriving once every scripted request is consumed.
    pub(crate) fn cancel_when_drained(mut self, token: CancellationToken) -> Self {
        self.cancel_on_drain = Some(token);
        self
    }

    pub(crate) fn responses(&self) -> Vec<CommandResponse> {
        self.replies.lock().expect("replies lock").clone()
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls
    }
}

impl RequestSource for ScriptedSource {
    fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    fn next_request(&mut self, _cancel: &CancellationToken) -> Option<InboundRequest> {
        let Some(request) = self.queue.pop_front() else {
            if let Some(token) = &self.cancel_on_drain {
                token.cancel();
            }
            return None;
        };
        let reply = RecordingReply {
            replies: Arc::clone(&self.replies),
        };
        Some(InboundRequest::new(request, Box::new(reply)))
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
    }
}

/// Shared sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `action` under a plain-text subscriber scoped to this thread and
/// returns its result with everything logged meanwhile.
pub(crate) fn capture_logs<T>(action: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let sink = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_ansi(false)
        .with_max_level(Level::TRACE)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, action);
    let bytes = buffer.0.lock().expect("log buffer poisoned").clone();
    (result, String::from_utf8_lossy(&bytes).into_owned())
}

/// The single captured line containing `message`.
pub(crate) fn log_line<'a>(logs: &'a str, message: &str) -> &'a str {
    let mut lines = logs.lines().filter(|line| line.contains(message));
    let line = lines
        .next()
        .unwrap_or_else(|| panic!("no log line contains {message:?} in:\n{logs}"));
    assert!(lines.next().is_none(), "{message:?} logged more than once");
    line
}
