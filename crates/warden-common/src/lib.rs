//! Wire types shared between the policy, core, and server crates.
//!
//! Nothing in this crate touches I/O or holds state; it exists purely so the
//! MCP JSON-RPC shapes and the audit record shape have one definition instead
//! of three.

use serde::{Deserialize, Serialize};

/// A single block of tool output content, per the MCP content-block shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }
}

/// The `result` payload of a `tools/call` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }
}

/// An entry in the `tools/list` response: name, description, JSON Schema for
/// arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `serverInfo` advertised during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// One line of the audit log. Internally tagged on `kind` so the on-disk
/// shape matches the wire examples exactly:
/// `{"ts":"...","kind":"request","request_id":"abc","tool":"x","arguments":{}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Request {
        ts: chrono::DateTime<chrono::Utc>,
        request_id: serde_json::Value,
        tool: String,
        arguments: serde_json::Value,
    },
    Response {
        ts: chrono::DateTime<chrono::Utc>,
        request_id: serde_json::Value,
        status: AuditStatus,
        duration_ms: u64,
    },
    SecurityEvent {
        ts: chrono::DateTime<chrono::Utc>,
        event_type: String,
        detail: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Error,
}
