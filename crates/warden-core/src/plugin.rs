//! Tool plugin contract. A plugin advertises one [`ToolDefinition`] and
//! executes synchronously; the dispatcher is responsible for timeouts and
//! for catching panics so one broken plugin cannot take the server down.

use warden_common::{ToolDefinition, ToolResult};

pub trait Plugin: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. `arguments` has already passed schema validation and
    /// sanitization by the time this is called.
    fn call(&self, arguments: serde_json::Value) -> ToolResult;
}
