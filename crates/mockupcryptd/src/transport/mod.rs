//! Socket transport feeding the dispatch loop.
//!
//! The listener binds the configured endpoint and accepts connections on a
//! background thread. Every connection gets a reader thread that decodes
//! JSONL requests and forwards them over a channel; [`SocketRequestSource`]
//! is the receiving end and implements
//! [`RequestSource`](crate::dispatch::RequestSource).

mod connection;
mod errors;
mod listener;
#[cfg(test)]
mod listener_tests;
mod source;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub use self::source::SocketRequestSource;

pub(crate) use self::connection::{ChannelConnectionHandler, ConnectionHandler, ConnectionStream};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Maximum size of a single request line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;
