//! Reference tool plugin: echoes its `message` argument back. Exists to
//! exercise the dispatcher and security pipeline end to end without
//! depending on any real external collaborator.

use serde_json::{json, Value};
use warden_core::plugin::Plugin;
use warden_common::{ContentBlock, ToolDefinition, ToolResult};

pub struct EchoTool;

impl Plugin for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echoes the provided message back as tool output.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                },
                "required": ["message"],
                "additionalProperties": false
            }),
        }
    }

    fn call(&self, arguments: Value) -> ToolResult {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        ToolResult::ok(vec![ContentBlock::text(message)])
    }
}
