//! Tests for the socket listener and the request source built on it.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use mockupcryptd_config::SocketEndpoint;

use crate::dispatch::{CancellationToken, CommandResponse, RequestSource};

use super::listener::SocketListener;
use super::{ConnectionHandler, CountingHandler, ListenerError, SocketRequestSource};

#[fixture]
fn tcp_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if count.load(Ordering::SeqCst) >= expected {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn tcp_port(endpoint: &SocketEndpoint) -> u16 {
    match endpoint {
        SocketEndpoint::Tcp { port, .. } => *port,
        SocketEndpoint::Unix { .. } => panic!("expected a TCP endpoint"),
    }
}

#[rstest]
fn tcp_listener_accepts_connections(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener
        .local_addr()
        .expect("listener should report local address");
    let (count, handler) = CountingHandler::new();
    let handler: Arc<dyn ConnectionHandler> = handler;
    let handle = listener.start(handler).expect("start listener");

    TcpStream::connect(addr).expect("connect first client");
    TcpStream::connect(addr).expect("connect second client");

    assert!(wait_for_count(&count, 2), "expected two connections");
    handle.shutdown();
    handle.join().expect("join listener");
}

#[rstest]
fn tcp_listener_reports_assigned_port(tcp_endpoint: SocketEndpoint) {
    let listener = SocketListener::bind(&tcp_endpoint).expect("bind tcp listener");
    let addr = listener.local_addr().expect("local address");
    assert_eq!(tcp_port(listener.endpoint()), addr.port());
    assert_ne!(addr.port(), 0);
}

#[rstest]
fn request_source_delivers_requests_and_replies(tcp_endpoint: SocketEndpoint) {
    let mut source = SocketRequestSource::bind(&tcp_endpoint).expect("bind source");
    let port = tcp_port(source.endpoint());
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect client");
        stream
            .write_all(b"{\"commandName\":\"markFields\",\"arguments\":{\"data\":[]}}\n")
            .expect("write request");
        let mut line = String::new();
        BufReader::new(stream)
            .read_line(&mut line)
            .expect("read response");
        line
    });

    let cancel = CancellationToken::new();
    let mut inbound = source.next_request(&cancel).expect("request received");
    assert_eq!(inbound.request.to_string(), "markFields(data)");
    inbound
        .reply
        .send(&CommandResponse::error("nope"))
        .expect("send reply");
    drop(inbound);

    let line = client.join().expect("join client");
    assert_eq!(line, "{\"ok\":false,\"errorMessage\":\"nope\"}\n");
    source.stop();
}

#[rstest]
fn cancellation_unblocks_receive(tcp_endpoint: SocketEndpoint) {
    let mut source = SocketRequestSource::bind(&tcp_endpoint).expect("bind source");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    assert!(source.next_request(&cancel).is_none());
    canceller.join().expect("join canceller");
    source.stop();
}

#[cfg(unix)]
#[fixture]
fn unix_tempdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[cfg(unix)]
#[rstest]
fn unix_listener_cleans_stale_socket_files(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("mongocryptd.sock");
    {
        let _stale = std::os::unix::net::UnixListener::bind(&path).expect("bind stale listener");
    }
    assert!(path.exists(), "stale socket should remain");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let listener = SocketListener::bind(&endpoint).expect("bind new listener");
    let (_, handler) = CountingHandler::new();
    let handle = listener.start(handler).expect("start listener");

    std::os::unix::net::UnixStream::connect(&path).expect("connect unix client");

    handle.shutdown();
    handle.join().expect("join listener");
    assert!(
        !path.exists(),
        "listener should remove unix socket on shutdown"
    );
}

#[cfg(unix)]
#[rstest]
fn unix_listener_rejects_in_use_socket(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("mongocryptd.sock");
    let _existing = std::os::unix::net::UnixListener::bind(&path).expect("bind existing listener");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::UnixInUse { .. }));
}

#[cfg(unix)]
#[rstest]
fn unix_listener_refuses_regular_files(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("mongocryptd.sock");
    std::fs::write(&path, b"not a socket").expect("write file");

    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let error = SocketListener::bind(&endpoint).expect_err("should fail bind");
    assert!(matches!(error, ListenerError::UnixNotSocket { .. }));
}

#[cfg(unix)]
#[rstest]
fn stopping_source_twice_is_harmless(unix_tempdir: tempfile::TempDir) {
    let path = unix_tempdir.path().join("mongocryptd.sock");
    let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path"));
    let mut source = SocketRequestSource::bind(&endpoint).expect("bind source");
    assert!(path.exists());

    source.stop();
    source.stop();
    assert!(!path.exists());
}
