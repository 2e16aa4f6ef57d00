//! JSON-RPC 2.0 line codec: one text line in, one of `Request` /
//! `Notification` / `ParseError` out. Also carries the wire structs for
//! responses and the canonical error codes.

use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reject ceiling for a raw message line, enforced before UTF-8/JSON
/// parsing even begins.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// A parsed JSON-RPC request carrying an `id`.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

/// A parsed JSON-RPC request with no `id` — never gets a response.
#[derive(Debug, Clone)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

/// Result of parsing one line.
pub enum JsonRpcMessage {
    Request(Request),
    Notification(Notification),
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// Parse one line of input. `raw` is the exact bytes read from the
/// transport, before any UTF-8 validation, so the size cap applies to the
/// true wire size.
pub fn parse_line(raw: &[u8]) -> Result<JsonRpcMessage, ProtocolError> {
    if raw.len() > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::InvalidRequest(
            "message exceeds 1 MiB size limit".to_string(),
        ));
    }

    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::ParseError)?;
    let raw_msg: RawMessage =
        serde_json::from_str(text).map_err(|_| ProtocolError::ParseError)?;

    if raw_msg.jsonrpc != "2.0" {
        return Err(ProtocolError::InvalidRequest(
            "jsonrpc must be \"2.0\"".to_string(),
        ));
    }
    let method = match raw_msg.method {
        Some(m) if !m.is_empty() => m,
        _ => {
            return Err(ProtocolError::InvalidRequest(
                "method must be a non-empty string".to_string(),
            ))
        }
    };

    match raw_msg.id {
        None => Ok(JsonRpcMessage::Notification(Notification {
            method,
            params: raw_msg.params,
        })),
        Some(id) => {
            if !(id.is_string() || id.is_i64() || id.is_u64() || id.is_null()) {
                return Err(ProtocolError::InvalidRequest(
                    "id must be a string, integer, or null".to_string(),
                ));
            }
            Ok(JsonRpcMessage::Request(Request {
                id,
                method,
                params: raw_msg.params,
            }))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: &ProtocolError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(ErrorObject {
                code: error.code(),
                message: error.message(),
                data: None,
            }),
        }
    }

    /// Serialize with a trailing newline, ready to write to the transport.
    pub fn to_line(&self) -> String {
        let mut s = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"internal error"}}"#
                .to_string()
        });
        s.push('\n');
        s
    }
}
