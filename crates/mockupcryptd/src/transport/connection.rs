//! Per-connection framing.
//!
//! A connection carries any number of request lines. The reader decodes one
//! line, hands it to the dispatch loop and waits until that request has been
//! answered (or dropped, for `shutdown`) before reading the next, so
//! responses leave in request order.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Sender};

use tracing::{debug, warn};

use crate::dispatch::{
    CommandRequest, CommandResponse, DispatchError, InboundRequest, ReplySink, ResponseWriter,
};

use super::{LISTENER_TARGET, MAX_REQUEST_BYTES};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Stream types accepted by the listener.
#[derive(Debug)]
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Second handle onto the same socket, used as the write half.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection until the peer disconnects. Runs on its
    /// own thread.
    fn handle(&self, stream: ConnectionStream);
}

/// Decodes requests from a connection and forwards them to the dispatch loop.
#[derive(Debug)]
pub(crate) struct ChannelConnectionHandler {
    requests: Sender<InboundRequest>,
}

impl ChannelConnectionHandler {
    pub(crate) fn new(requests: Sender<InboundRequest>) -> Self {
        Self { requests }
    }

    fn serve(&self, stream: ConnectionStream) -> Result<(), DispatchError> {
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        loop {
            let decoded = match read_request_line(&mut reader) {
                Ok(None) => break,
                Ok(Some(line)) if line.trim_ascii().is_empty() => continue,
                Ok(Some(line)) => CommandRequest::parse(&line),
                Err(error) => Err(error),
            };
            match decoded {
                Ok(request) => {
                    if !self.forward(request, writer.try_clone()?) {
                        debug!(target: LISTENER_TARGET, "dispatch loop gone; closing connection");
                        return Ok(());
                    }
                }
                Err(error) => reject(&mut writer, error)?,
            }
        }
        debug!(target: LISTENER_TARGET, "client disconnected");
        Ok(())
    }

    /// Sends one request to the loop and blocks until its reply sink is
    /// dropped. Returns false once the loop has stopped receiving.
    fn forward(&self, request: CommandRequest, stream: ConnectionStream) -> bool {
        let (done, answered) = mpsc::channel::<()>();
        let reply = StreamReply {
            stream,
            _done: done,
        };
        if self
            .requests
            .send(InboundRequest::new(request, Box::new(reply)))
            .is_err()
        {
            return false;
        }
        // Ends when the sink is dropped.
        while answered.recv().is_ok() {}
        true
    }
}

impl ConnectionHandler for ChannelConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        if let Err(error) = self.serve(stream) {
            warn!(target: LISTENER_TARGET, %error, "connection closed with error");
        }
    }
}

/// Answers an undecodable line. Returns the error when the connection has to
/// close because the stream position is no longer trustworthy.
fn reject(writer: &mut ConnectionStream, error: DispatchError) -> Result<(), DispatchError> {
    warn!(target: LISTENER_TARGET, %error, "rejected request line");
    let reported = ResponseWriter::new(writer).write_error(&error);
    if let Err(write_error) = &reported {
        debug!(
            target: LISTENER_TARGET,
            error = %write_error,
            "could not report rejected request"
        );
    }
    if !error.is_recoverable() {
        return Err(error);
    }
    reported
}

struct StreamReply {
    stream: ConnectionStream,
    _done: Sender<()>,
}

impl ReplySink for StreamReply {
    fn send(&mut self, response: &CommandResponse) -> Result<(), DispatchError> {
        ResponseWriter::new(&mut self.stream).write_response(response)
    }
}

/// Reads one newline-terminated request, bounded by [`MAX_REQUEST_BYTES`].
///
/// Returns `Ok(None)` at end of stream. A trailing line without a newline is
/// still returned.
pub(crate) fn read_request_line<R: BufRead>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, DispatchError> {
    let limit = u64::try_from(MAX_REQUEST_BYTES)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut line = Vec::new();
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_REQUEST_BYTES {
        return Err(DispatchError::request_too_large(
            line.len(),
            MAX_REQUEST_BYTES,
        ));
    }
    Ok(Some(line))
}
