//! Tool registry: name -> plugin, name -> compiled JSON Schema. Built once
//! at startup through [`DispatcherBuilder`], then treated as read-only for
//! the life of the process.

use crate::errors::ValidationError;
use jsonschema::Validator;
use warden_common::{ToolDefinition, ToolResult};

struct Entry {
    name: String,
    plugin: Box<dyn crate::plugin::Plugin>,
    validator: Validator,
}

pub struct DispatcherBuilder {
    entries: Vec<Entry>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a plugin, compiling its advertised input schema once so
    /// later calls never pay parse cost. Registration order is preserved
    /// for `tools/list`.
    pub fn register(mut self, plugin: Box<dyn crate::plugin::Plugin>) -> Self {
        let definition = plugin.definition();
        let validator = jsonschema::validator_for(&definition.input_schema)
            .unwrap_or_else(|e| panic!("tool '{}' has an invalid input schema: {e}", definition.name));
        self.entries.push(Entry {
            name: definition.name,
            plugin,
            validator,
        });
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            entries: self.entries,
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Dispatcher {
    entries: Vec<Entry>,
}

impl Dispatcher {
    /// Tool definitions in registration order, for `tools/list`.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.plugin.definition()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Validate `arguments` against the tool's schema, then invoke it.
    /// A plugin panic is caught and turned into an error `ToolResult`
    /// rather than taking the whole server down.
    pub fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ValidationError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ValidationError::new("unknown tool", format!("no such tool: {name}")))?;
        let (plugin, validator) = (&entry.plugin, &entry.validator);

        if let Err(e) = validator.validate(&arguments) {
            return Err(ValidationError::new(
                "arguments do not match the tool's schema",
                e.to_string(),
            ));
        }

        let plugin = std::panic::AssertUnwindSafe(plugin.as_ref());
        let arguments_for_panic = arguments.clone();
        match std::panic::catch_unwind(move || {
            let plugin = plugin;
            plugin.0.call(arguments)
        }) {
            Ok(result) => Ok(result),
            Err(_) => {
                tracing::warn!(tool = name, "plugin panicked during call");
                Ok(ToolResult::error(format!(
                    "tool '{name}' failed unexpectedly while handling {arguments_for_panic}"
                )))
            }
        }
    }
}
