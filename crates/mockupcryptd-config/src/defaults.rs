use crate::socket::SocketEndpoint;

/// Socket path clients of the production daemon connect to by default.
pub const DEFAULT_UNIX_SOCKET: &str = "/tmp/mongocryptd.sock";

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 27020;

/// Default log filter expression. The double is a debugging aid, so it is
/// chatty unless told otherwise.
pub const DEFAULT_LOG_FILTER: &str = "debug";

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Computes the default socket endpoint for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    #[cfg(unix)]
    {
        SocketEndpoint::unix(DEFAULT_UNIX_SOCKET)
    }

    #[cfg(not(unix))]
    {
        SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
    }
}
