//! Request decoding for the dispatch loop.
//!
//! Each request is one JSON line:
//!
//! ```json
//! {"commandName":"markFields","arguments":{"data":[{"encryptMe":true}],"schema":{}}}
//! ```
//!
//! `arguments` may be omitted. Argument values are kept as raw JSON; handlers
//! decide what shape they expect.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::errors::DispatchError;

/// Decoded command request from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    command_name: String,
    #[serde(default)]
    arguments: CommandArguments,
}

impl CommandRequest {
    /// Builds a request in memory.
    pub fn new(command_name: impl Into<String>, arguments: CommandArguments) -> Self {
        Self {
            command_name: command_name.into(),
            arguments,
        }
    }

    /// Parses a JSONL line into a command request.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed before
    /// parsing.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedJsonl` if the line is empty or is not
    /// a JSON request object, and `DispatchError::InvalidStructure` if the
    /// command name is blank.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii_end();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        let request: Self =
            serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        if request.command_name.trim().is_empty() {
            return Err(DispatchError::invalid_structure("commandName field is empty"));
        }
        Ok(request)
    }

    /// Returns the command name exactly as sent.
    pub fn command_name(&self) -> &str {
        self.command_name.as_str()
    }

    /// Read access to the arguments.
    pub fn arguments(&self) -> &CommandArguments {
        &self.arguments
    }

    /// Mutable access for handlers that consume or rewrite arguments.
    pub fn arguments_mut(&mut self) -> &mut CommandArguments {
        &mut self.arguments
    }
}

/// Formats the request identity used in logs and error responses: the command
/// name followed by the sorted argument names. Argument values never appear.
impl fmt::Display for CommandRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.arguments.names().collect();
        names.sort_unstable();
        write!(formatter, "{}(", self.command_name)?;
        for (position, name) in names.into_iter().enumerate() {
            if position > 0 {
                formatter.write_str(", ")?;
            }
            formatter.write_str(name)?;
        }
        formatter.write_str(")")
    }
}

/// Named arguments attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct CommandArguments(Map<String, Value>);

impl CommandArguments {
    /// Returns true when an argument with this name was supplied.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Borrows an argument value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Removes an argument so a handler can take ownership of it.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Argument names in map order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no arguments were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for CommandArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K> FromIterator<(K, Value)> for CommandArguments
where
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}
