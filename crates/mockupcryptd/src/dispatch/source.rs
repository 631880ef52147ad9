//! Boundary between the dispatch loop and whatever delivers requests.

use mockupcryptd_config::SocketEndpoint;

use super::cancel::CancellationToken;
use super::errors::DispatchError;
use super::request::CommandRequest;
use super::response::CommandResponse;

/// Destination for the single response a request produces.
pub trait ReplySink: Send {
    /// Delivers the response to the requesting client.
    fn send(&mut self, response: &CommandResponse) -> Result<(), DispatchError>;
}

/// A decoded request paired with the channel its response goes back on.
pub struct InboundRequest {
    /// The decoded request.
    pub request: CommandRequest,
    /// Where the response is written.
    pub reply: Box<dyn ReplySink>,
}

impl InboundRequest {
    /// Pairs a request with its reply sink.
    pub fn new(request: CommandRequest, reply: Box<dyn ReplySink>) -> Self {
        Self { request, reply }
    }
}

impl std::fmt::Debug for InboundRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("InboundRequest")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Producer of requests consumed by [`Dispatcher`](super::Dispatcher).
pub trait RequestSource {
    /// Endpoint clients connect to. Available once the source is ready.
    fn endpoint(&self) -> &SocketEndpoint;

    /// Blocks until the next request arrives.
    ///
    /// Returns `None` when the source has closed or `cancel` fired while
    /// waiting.
    fn next_request(&mut self, cancel: &CancellationToken) -> Option<InboundRequest>;

    /// Releases the underlying endpoint.
    fn stop(&mut self);
}
