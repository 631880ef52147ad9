//! Command name to handler mapping.
//!
//! The registry is assembled once before the loop starts and is read-only
//! afterwards. Adding a command means registering another [`CommandHandler`];
//! the loop body does not change.

use std::collections::HashMap;
use std::fmt;

use super::errors::HandlerFault;
use super::mark_fields::MarkFields;
use super::request::CommandArguments;
use super::response::CommandResponse;

/// Result of invoking a handler.
///
/// `Ok` carries whatever the client should see, including business-level
/// rejections such as missing arguments. `Err` is reserved for faults the
/// handler did not anticipate; the loop turns those into a generic
/// internal-error response.
pub type HandlerResult = Result<CommandResponse, HandlerFault>;

/// A named command implementation.
pub trait CommandHandler: Send + Sync {
    /// Command name the handler answers to.
    fn name(&self) -> &'static str;

    /// Executes the command against the request arguments.
    fn handle(&self, arguments: &mut CommandArguments) -> HandlerResult;
}

/// Read-only lookup table from command name to handler.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Starts an empty registry.
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::default()
    }

    /// Registry with every command the daemon serves.
    pub fn standard() -> Self {
        Self::builder().register(MarkFields).build()
    }

    /// Resolves a command name. Matching is exact and case-sensitive.
    pub fn lookup(&self, name: &str) -> Option<&dyn CommandHandler> {
        self.handlers.get(name).map(Box::as_ref)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CommandRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}

/// Accumulates handlers before the registry is frozen.
#[derive(Default)]
pub struct CommandRegistryBuilder {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandRegistryBuilder {
    /// Adds a handler. A later registration for the same name replaces the
    /// earlier one.
    #[must_use]
    pub fn register(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.handlers.insert(handler.name(), Box::new(handler));
        self
    }

    /// Freezes the registry.
    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            handlers: self.handlers,
        }
    }
}
