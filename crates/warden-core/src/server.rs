//! Central request orchestrator. Owns the [`LifecycleState`], the
//! [`Dispatcher`] of registered tools, and the [`SecurityEngine`]; every
//! line the transport reads is handed to [`Server::handle`], which returns
//! the line (if any) to write back.

use crate::dispatcher::Dispatcher;
use crate::errors::ProtocolError;
use crate::jsonrpc::{self, JsonRpcMessage, Response};
use crate::lifecycle::{LifecycleState, PROTOCOL_VERSION};
use crate::security_engine::SecurityEngine;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Handle;
use warden_common::{AuditStatus, ServerInfo, ToolResult};

/// What the transport should do with the result of handling one line.
pub enum HandlerOutcome {
    /// Write this line (already newline-terminated) to stdout.
    Response(String),
    /// The input was a notification; nothing is written back.
    Notification,
    /// EOF or an otherwise silent transition.
    None,
}

pub struct Server {
    state: Mutex<LifecycleState>,
    dispatcher: Arc<Dispatcher>,
    security: SecurityEngine,
    server_info: ServerInfo,
    runtime: Handle,
}

impl Server {
    pub fn new(
        dispatcher: Dispatcher,
        security: SecurityEngine,
        server_info: ServerInfo,
        runtime: Handle,
    ) -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
            dispatcher: Arc::new(dispatcher),
            security,
            server_info,
            runtime,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(*self.state.lock().unwrap(), LifecycleState::ShuttingDown)
    }

    pub fn handle_eof(&self) {
        let mut state = self.state.lock().unwrap();
        *state = state.on_eof();
        self.security.close();
    }

    /// Parse one line and run it through the lifecycle gate, then dispatch.
    /// Transport-level errors (parse failures, malformed envelopes) are
    /// turned into JSON-RPC error responses here so the transport never has
    /// to know the wire format.
    pub fn handle(&self, raw: &[u8]) -> HandlerOutcome {
        let message = match jsonrpc::parse_line(raw) {
            Ok(m) => m,
            Err(e) => return HandlerOutcome::Response(Response::err(Value::Null, &e).to_line()),
        };

        match message {
            JsonRpcMessage::Notification(n) => {
                let mut state = self.state.lock().unwrap();
                if let Ok(next) = state.on_method(&n.method) {
                    *state = next;
                }
                HandlerOutcome::Notification
            }
            JsonRpcMessage::Request(r) => {
                let next_state = {
                    let mut state = self.state.lock().unwrap();
                    match state.on_method(&r.method) {
                        Ok(next) => {
                            *state = next;
                            None
                        }
                        Err(e) => Some(e),
                    }
                };
                if let Some(e) = next_state {
                    return HandlerOutcome::Response(Response::err(r.id, &e).to_line());
                }

                let result = self.dispatch(&r.method, &r.id, r.params);
                match result {
                    Ok(value) => HandlerOutcome::Response(Response::ok(r.id, value).to_line()),
                    Err(e) => HandlerOutcome::Response(Response::err(r.id, &e).to_line()),
                }
            }
        }
    }

    fn dispatch(&self, method: &str, id: &Value, params: Value) -> Result<Value, ProtocolError> {
        match method {
            "initialize" => Ok(self.handle_initialize()),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(id, params),
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": true } },
            "serverInfo": self.server_info,
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": self.dispatcher.list_tools() })
    }

    fn handle_tools_call(&self, id: &Value, params: Value) -> Result<Value, ProtocolError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidParams("missing tool name".to_string()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        if !self.dispatcher.has_tool(&name) {
            return Err(ProtocolError::InvalidParams(format!("unknown tool: {name}")));
        }

        let cleaned_arguments = match self.security.check_input(&arguments) {
            Ok(cleaned) => cleaned,
            Err(e) => {
                match e.network_reason {
                    Some(reason) => self.security.on_security_event(
                        "network_blocked",
                        json!({ "tool": name, "reason": reason }),
                    ),
                    None => self.security.on_security_event(
                        "validation_failed",
                        json!({ "tool": name, "detail": e.detail }),
                    ),
                }
                return Ok(json!({
                    "content": [{ "type": "text", "text": e.message }],
                    "isError": true,
                }));
            }
        };

        if let Err(e) = self.security.check_rate(&name) {
            self.security.on_security_event(
                "rate_limit_exceeded",
                json!({ "tool": name, "retry_after_ms": e.retry_after_ms }),
            );
            return Ok(json!({
                "content": [{ "type": "text", "text": e.to_string() }],
                "isError": true,
            }));
        }

        self.security.on_request(id.clone(), &name, &cleaned_arguments);
        let start = Instant::now();

        let result = self.call_with_timeout(&name, cleaned_arguments);
        if result.is_error
            && result
                .content
                .first()
                .is_some_and(|c| matches!(c, warden_common::ContentBlock::Text { text } if text == "timeout"))
        {
            self.security
                .on_security_event("timeout", json!({ "tool": name }));
        }

        let status = if result.is_error {
            AuditStatus::Error
        } else {
            AuditStatus::Success
        };
        self.security
            .on_response(id.clone(), status, start.elapsed().as_millis() as u64);

        serde_json::to_value(&result)
            .map_err(|e| ProtocolError::InternalError(e.to_string()))
    }

    /// Run `dispatcher.call` on a blocking thread, bounded by the policy's
    /// configured timeout. A timeout is surfaced as a tool-result error,
    /// never as a JSON-RPC error; the abandoned call's resources are the
    /// plugin's own responsibility to reclaim.
    fn call_with_timeout(&self, name: &str, arguments: Value) -> ToolResult {
        let dispatcher = Arc::clone(&self.dispatcher);
        let timeout = self.security.timeout();
        let name_owned = name.to_string();
        let name_for_timeout = name.to_string();

        self.runtime.block_on(async move {
            let task = tokio::task::spawn_blocking(move || dispatcher.call(&name_owned, arguments));
            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(e))) => ToolResult::error(e.message),
                Ok(Err(_join_error)) => {
                    ToolResult::error(format!("tool '{name_for_timeout}' panicked"))
                }
                Err(_elapsed) => ToolResult::error("timeout"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherBuilder;
    use crate::plugin::Plugin;
    use std::sync::Arc;
    use warden_common::{ContentBlock, ToolDefinition, ToolResult};
    use warden_policy::Policy;

    struct Echo;
    impl Plugin for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "echoes its input".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }),
            }
        }
        fn call(&self, arguments: Value) -> ToolResult {
            ToolResult::ok(vec![ContentBlock::text(
                arguments["message"].as_str().unwrap_or_default(),
            )])
        }
    }

    fn test_runtime_handle() -> Handle {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        Box::leak(Box::new(runtime)).handle().clone()
    }

    fn server() -> Server {
        let policy = Arc::new(Policy::from_str("version: \"1\"\n").unwrap());
        let security = SecurityEngine::open(policy).unwrap();
        let dispatcher = DispatcherBuilder::new().register(Box::new(Echo)).build();
        Server::new(
            dispatcher,
            security,
            ServerInfo { name: "warden".to_string(), version: "0.1.0".to_string() },
            test_runtime_handle(),
        )
    }

    fn send(server: &Server, line: &str) -> String {
        match server.handle(line.as_bytes()) {
            HandlerOutcome::Response(s) => s,
            _ => panic!("expected a response"),
        }
    }

    fn initialize(server: &Server) {
        send(server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
        match server.handle(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#) {
            HandlerOutcome::Notification => {}
            _ => panic!("expected notification"),
        }
    }

    #[test]
    fn tools_call_before_initialize_is_rejected() {
        let server = server();
        let line = send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#);
        assert!(line.contains("\"error\""));
    }

    #[test]
    fn full_handshake_then_tools_list() {
        let server = server();
        initialize(&server);
        let line = send(&server, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#);
        assert!(line.contains("\"echo\""));
    }

    #[test]
    fn tools_call_returns_tool_output() {
        let server = server();
        initialize(&server);
        let line = send(
            &server,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
        );
        assert!(line.contains("\"hi\""));
        assert!(!line.contains("\"isError\":true"));
    }

    #[test]
    fn unknown_tool_is_invalid_params() {
        let server = server();
        initialize(&server);
        let line = send(
            &server,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"missing","arguments":{}}}"#,
        );
        assert!(line.contains("-32602"));
    }

    #[test]
    fn eof_moves_to_shutting_down() {
        let server = server();
        server.handle_eof();
        assert!(server.is_shutting_down());
    }
}
