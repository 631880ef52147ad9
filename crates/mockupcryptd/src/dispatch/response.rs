//! Response serialisation for the dispatch loop.
//!
//! Every processed request except `shutdown` produces exactly one
//! [`CommandResponse`], written back as a single JSON line:
//!
//! ```json
//! {"ok":true,"payload":{"data":[{"encryptMe":{"$binary":{"base64":"","subType":"07"}}}]}}
//! {"ok":false,"errorMessage":"Missing argument 'schema'"}
//! ```

use std::io::Write;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::DispatchError;

/// Terminal outcome of a command, as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    /// The command succeeded; the payload fields are returned verbatim.
    Success {
        /// Response fields.
        payload: Map<String, Value>,
    },
    /// The command was rejected or failed.
    Error {
        /// Human-readable description for the client.
        message: String,
    },
}

impl CommandResponse {
    /// Creates a success response from payload fields.
    pub fn success<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Success {
            payload: fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for success responses.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the payload of a success response.
    pub fn payload(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Success { payload } => Some(payload),
            Self::Error { .. } => None,
        }
    }

    /// Returns the message of an error response.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { message } => Some(message.as_str()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

impl Serialize for CommandResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        WireResponse {
            ok: self.is_ok(),
            payload: self.payload(),
            error_message: self.error_message(),
        }
        .serialize(serializer)
    }
}

/// Writer that frames responses as JSON lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a response as one line and flushes the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation, writing or flushing fails.
    pub fn write_response(&mut self, response: &CommandResponse) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, response)
            .map_err(DispatchError::SerializeResponse)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Reports a decoding failure to the client as an error response.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_error(&mut self, error: &DispatchError) -> Result<(), DispatchError> {
        self.write_response(&CommandResponse::error(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn written(response: &CommandResponse) -> String {
        let mut output = Vec::new();
        ResponseWriter::new(&mut output)
            .write_response(response)
            .expect("write response");
        String::from_utf8(output).expect("valid utf8")
    }

    #[test]
    fn writes_success_line() {
        let response = CommandResponse::success([("data", json!([{"x": 1}]))]);
        let line = written(&response);
        assert_eq!(line, "{\"ok\":true,\"payload\":{\"data\":[{\"x\":1}]}}\n");
    }

    #[test]
    fn writes_error_line() {
        let line = written(&CommandResponse::error("Missing argument 'schema'"));
        assert_eq!(
            line,
            "{\"ok\":false,\"errorMessage\":\"Missing argument 'schema'\"}\n"
        );
    }

    #[test]
    fn write_error_reports_decoding_failure() {
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        writer
            .write_error(&DispatchError::malformed("empty request line"))
            .expect("write error");

        let response = String::from_utf8(output).expect("valid utf8");
        assert!(response.contains(r#""ok":false"#));
        assert!(response.contains("malformed request: empty request line"));
    }
}
