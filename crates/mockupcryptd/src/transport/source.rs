//! Channel-backed request source fed by the socket listener.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{info, warn};

use mockupcryptd_config::SocketEndpoint;

use crate::dispatch::{CancellationToken, InboundRequest, RequestSource};

use super::{ChannelConnectionHandler, LISTENER_TARGET, ListenerError, ListenerHandle, SocketListener};

/// How often a blocked receive checks the cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bound socket whose decoded requests are consumed by the dispatch loop.
#[derive(Debug)]
pub struct SocketRequestSource {
    endpoint: SocketEndpoint,
    requests: Receiver<InboundRequest>,
    listener: Option<ListenerHandle>,
}

impl SocketRequestSource {
    /// Binds the endpoint and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the endpoint cannot be bound, for
    /// example because another process is serving the same Unix socket.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = SocketListener::bind(endpoint)?;
        let bound = listener.endpoint().clone();
        let (sender, requests) = mpsc::channel();
        let handle = listener.start(Arc::new(ChannelConnectionHandler::new(sender)))?;
        Ok(Self {
            endpoint: bound,
            requests,
            listener: Some(handle),
        })
    }
}

impl RequestSource for SocketRequestSource {
    fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    fn next_request(&mut self, cancel: &CancellationToken) -> Option<InboundRequest> {
        loop {
            match self.requests.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(inbound) => return Some(inbound),
                Err(RecvTimeoutError::Timeout) if cancel.is_cancelled() => return None,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn stop(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        listener.shutdown();
        match listener.join() {
            Ok(()) => info!(target: LISTENER_TARGET, endpoint = %self.endpoint, "listener released"),
            Err(error) => warn!(target: LISTENER_TARGET, %error, "listener did not stop cleanly"),
        }
    }
}

impl Drop for SocketRequestSource {
    fn drop(&mut self) {
        self.stop();
    }
}
