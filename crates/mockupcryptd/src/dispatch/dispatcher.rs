//! The serial dispatch loop.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use super::DISPATCH_TARGET;
use super::cancel::CancellationToken;
use super::errors::HandlerFault;
use super::registry::{CommandRegistry, HandlerResult};
use super::request::CommandRequest;
use super::response::CommandResponse;
use super::source::{InboundRequest, RequestSource};

/// Command that stops the loop without producing a response.
pub const SHUTDOWN_COMMAND: &str = "shutdown";

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A client sent [`SHUTDOWN_COMMAND`].
    ShutdownCommand,
    /// The cancellation token fired.
    Interrupted,
    /// The request source closed on its own.
    SourceClosed,
}

enum Step {
    Continue,
    Stop,
}

/// Routes requests from a [`RequestSource`] to registered handlers, one at a
/// time.
#[derive(Debug)]
pub struct Dispatcher {
    registry: CommandRegistry,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    /// Runs until a shutdown request, cancellation, or source closure.
    ///
    /// The source is stopped exactly once before this returns, whichever way
    /// the loop ends.
    pub fn run<S>(&self, source: &mut S, cancel: &CancellationToken) -> LoopExit
    where
        S: RequestSource + ?Sized,
    {
        let guard = TeardownGuard { source };
        let endpoint = guard.source.endpoint();
        info!(
            target: DISPATCH_TARGET,
            endpoint = %endpoint,
            uri = %endpoint.client_uri(),
            "mockupcryptd ready"
        );
        self.drive(guard, cancel)
    }

    fn drive<S>(&self, mut guard: TeardownGuard<'_, S>, cancel: &CancellationToken) -> LoopExit
    where
        S: RequestSource + ?Sized,
    {
        loop {
            if cancel.is_cancelled() {
                info!(target: DISPATCH_TARGET, "interrupt received");
                return LoopExit::Interrupted;
            }
            let Some(inbound) = guard.source.next_request(cancel) else {
                if cancel.is_cancelled() {
                    info!(target: DISPATCH_TARGET, "interrupt received");
                    return LoopExit::Interrupted;
                }
                debug!(target: DISPATCH_TARGET, "request source closed");
                return LoopExit::SourceClosed;
            };
            if let Step::Stop = self.process(inbound) {
                info!(target: DISPATCH_TARGET, "shutdown requested");
                return LoopExit::ShutdownCommand;
            }
        }
    }

    fn process(&self, inbound: InboundRequest) -> Step {
        let InboundRequest { request, mut reply } = inbound;
        if request.command_name() == SHUTDOWN_COMMAND {
            return Step::Stop;
        }
        let response = self.respond(request);
        if let Err(error) = reply.send(&response) {
            warn!(target: DISPATCH_TARGET, %error, "failed to deliver response");
        }
        Step::Continue
    }

    /// Produces the response for a non-shutdown request.
    pub fn respond(&self, mut request: CommandRequest) -> CommandResponse {
        let identity = request.to_string();
        debug!(target: DISPATCH_TARGET, request = %identity, "dispatching request");

        let Some(handler) = self.registry.lookup(request.command_name()) else {
            return CommandResponse::error(format!("Unrecognized request: {identity}"));
        };
        let arguments = request.arguments_mut();
        let outcome: HandlerResult =
            panic::catch_unwind(AssertUnwindSafe(|| handler.handle(arguments)))
                .unwrap_or_else(|payload| Err(HandlerFault::from_panic(payload.as_ref())));

        outcome.unwrap_or_else(|fault| {
            error!(
                target: DISPATCH_TARGET,
                request = %identity,
                %fault,
                "unexpected failure in command handler"
            );
            CommandResponse::error(format!("Internal error processing {identity}: {fault}"))
        })
    }
}

struct TeardownGuard<'a, S: RequestSource + ?Sized> {
    source: &'a mut S,
}

impl<S: RequestSource + ?Sized> Drop for TeardownGuard<'_, S> {
    fn drop(&mut self) {
        info!(target: DISPATCH_TARGET, "shutting down");
        self.source.stop();
    }
}
