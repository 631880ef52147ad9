//! Error types for request decoding and command handling.
//!
//! Two families live here. [`DispatchError`] covers everything that goes
//! wrong before a request reaches a handler or while its response travels
//! back: framing, JSON decoding, writing. [`HandlerFault`] is the "unexpected"
//! half of a handler's result; business-level rejections are ordinary
//! [`CommandResponse`](super::CommandResponse) values instead.

use std::io;

use thiserror::Error;

/// Errors surfaced while decoding requests or writing responses.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as valid JSON.
    #[error("malformed request: {message}")]
    MalformedJsonl {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON does not have the shape of a command request.
    #[error("invalid request structure: {message}")]
    InvalidStructure { message: String },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialisation failed.
    #[error("failed to serialise response: {0}")]
    SerializeResponse(#[source] serde_json::Error),
}

impl DispatchError {
    /// Creates a malformed JSONL error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSONL error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Returns true when the connection can keep reading after this error.
    ///
    /// Oversized requests and IO failures leave the byte stream at an unknown
    /// position, so the connection is dropped instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedJsonl { .. } | Self::InvalidStructure { .. }
        )
    }
}

/// Unexpected failure raised by a command handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerFault {
    /// An element of a document sequence was not a document.
    #[error("element {index} of '{argument}' is not a document")]
    NotADocument { argument: &'static str, index: usize },

    /// The handler panicked; the payload message is preserved.
    #[error("handler panicked: {message}")]
    Panicked { message: String },

    /// Any other internal failure.
    #[error("{message}")]
    Internal { message: String },
}

impl HandlerFault {
    /// Creates an internal fault.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Converts a panic payload captured by `catch_unwind` into a fault.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("non-string panic payload"));
        Self::Panicked { message }
    }
}
