//! The `markFields` command.
//!
//! Clients send a batch of documents plus a schema. Every document carrying
//! the `encryptMe` field gets that field's value replaced by the encryption
//! marker; everything else is echoed back untouched and in order.

use serde_json::{Value, json};
use tracing::info;

use super::DISPATCH_TARGET;
use super::errors::HandlerFault;
use super::registry::{CommandHandler, HandlerResult};
use super::request::CommandArguments;
use super::response::CommandResponse;

/// Command name.
pub const MARK_FIELDS_COMMAND: &str = "markFields";

/// Argument holding the document sequence.
pub const DATA_ARGUMENT: &str = "data";

/// Argument holding the schema. Only its presence is checked.
pub const SCHEMA_ARGUMENT: &str = "schema";

/// Field whose presence marks a document for encryption.
pub const SENTINEL_FIELD: &str = "encryptMe";

/// Binary subtype used to tag "marked for encryption" values.
pub const ENCRYPTION_MARKER_SUBTYPE: u8 = 7;

/// Placeholder written into marked fields: an empty binary value of subtype
/// [`ENCRYPTION_MARKER_SUBTYPE`], in MongoDB Extended JSON form.
pub fn marker_value() -> Value {
    json!({
        "$binary": {
            "base64": "",
            "subType": format!("{ENCRYPTION_MARKER_SUBTYPE:02x}"),
        }
    })
}

/// Handler for [`MARK_FIELDS_COMMAND`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkFields;

impl CommandHandler for MarkFields {
    fn name(&self) -> &'static str {
        MARK_FIELDS_COMMAND
    }

    fn handle(&self, arguments: &mut CommandArguments) -> HandlerResult {
        let Some(data) = arguments.take(DATA_ARGUMENT) else {
            return Ok(missing_argument(DATA_ARGUMENT));
        };
        if !arguments.contains(SCHEMA_ARGUMENT) {
            return Ok(missing_argument(SCHEMA_ARGUMENT));
        }
        let Value::Array(mut documents) = data else {
            return Ok(CommandResponse::error(format!(
                "'{DATA_ARGUMENT}' must be array of documents"
            )));
        };

        mark_documents(&mut documents)?;

        info!(
            target: DISPATCH_TARGET,
            documents = documents.len(),
            "markFields processed documents"
        );
        Ok(CommandResponse::success([(
            DATA_ARGUMENT,
            Value::Array(documents),
        )]))
    }
}

fn missing_argument(name: &str) -> CommandResponse {
    CommandResponse::error(format!("Missing argument '{name}'"))
}

fn mark_documents(documents: &mut [Value]) -> Result<(), HandlerFault> {
    for (index, document) in documents.iter_mut().enumerate() {
        let Value::Object(fields) = document else {
            return Err(HandlerFault::NotADocument {
                argument: DATA_ARGUMENT,
                index,
            });
        };
        if let Some(value) = fields.get_mut(SENTINEL_FIELD) {
            *value = marker_value();
        }
    }
    Ok(())
}
