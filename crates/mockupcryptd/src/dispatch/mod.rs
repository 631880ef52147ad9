//! Command dispatch for the mock marking daemon.
//!
//! A [`Dispatcher`] pulls [`InboundRequest`]s from a [`RequestSource`] one at
//! a time, resolves each command name through a [`CommandRegistry`] and sends
//! the handler's [`CommandResponse`] back through the request's reply sink.
//!
//! ## Protocol
//!
//! ```json
//! {"commandName":"markFields","arguments":{"data":[{"encryptMe":true},{"x":1}],"schema":{}}}
//! {"ok":true,"payload":{"data":[{"encryptMe":{"$binary":{"base64":"","subType":"07"}}},{"x":1}]}}
//! ```
//!
//! `shutdown` ends the loop and is never answered. Unknown commands and
//! handler faults produce `{"ok":false,"errorMessage":...}` lines and the loop
//! keeps running.

mod cancel;
mod dispatcher;
mod errors;
mod mark_fields;
mod registry;
mod request;
mod response;
mod source;
#[cfg(test)]
pub(crate) mod test_support;

pub use self::cancel::CancellationToken;
pub use self::dispatcher::{Dispatcher, LoopExit, SHUTDOWN_COMMAND};
pub use self::errors::{DispatchError, HandlerFault};
pub use self::mark_fields::{
    ENCRYPTION_MARKER_SUBTYPE, MARK_FIELDS_COMMAND, MarkFields, SENTINEL_FIELD, marker_value,
};
pub use self::registry::{CommandHandler, CommandRegistry, CommandRegistryBuilder, HandlerResult};
pub use self::request::{CommandArguments, CommandRequest};
pub use self::response::{CommandResponse, ResponseWriter};
pub use self::source::{InboundRequest, ReplySink, RequestSource};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
