//! End-to-end scenarios exercising the full `initialize` -> `tools/call`
//! flow through a real `Server`, one per documented scenario: handshake,
//! unknown tool, path traversal, rate limiting, oversized message, and
//! network rejection.

use serde_json::{json, Value};
use std::sync::Arc;
use warden_common::{ContentBlock, ServerInfo, ToolDefinition, ToolResult};
use warden_core::plugin::Plugin;
use warden_core::{DispatcherBuilder, HandlerOutcome, SecurityEngine, Server};
use warden_policy::Policy;

struct Echo;
impl Plugin for Echo {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "echoes its input".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" },
                    "path": { "type": "string" },
                    "url": { "type": "string" }
                }
            }),
        }
    }

    fn call(&self, arguments: Value) -> ToolResult {
        ToolResult::ok(vec![ContentBlock::text(
            arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        )])
    }
}

fn runtime_handle() -> tokio::runtime::Handle {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    Box::leak(Box::new(runtime)).handle().clone()
}

fn build_server(policy_yaml: &str) -> Server {
    let policy = Arc::new(Policy::from_str(policy_yaml).unwrap());
    let security = SecurityEngine::open(policy).unwrap();
    let dispatcher = DispatcherBuilder::new().register(Box::new(Echo)).build();
    Server::new(
        dispatcher,
        security,
        ServerInfo {
            name: "warden".to_string(),
            version: "0.1.0".to_string(),
        },
        runtime_handle(),
    )
}

fn send(server: &Server, line: &str) -> String {
    match server.handle(line.as_bytes()) {
        HandlerOutcome::Response(s) => s,
        _ => panic!("expected a response for {line}"),
    }
}

fn notify(server: &Server, line: &str) {
    match server.handle(line.as_bytes()) {
        HandlerOutcome::Notification => {}
        _ => panic!("expected a notification for {line}"),
    }
}

#[test]
fn initialization_handshake() {
    let server = build_server("version: \"1\"\n");

    let response = send(
        &server,
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-11-25","clientInfo":{"name":"t","version":"1"},"capabilities":{}}}"#,
    );
    let value: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(value["result"]["protocolVersion"], "2025-11-25");
    assert_eq!(value["result"]["capabilities"]["tools"]["listChanged"], true);

    let premature = send(
        &server,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
    );
    let premature_value: Value = serde_json::from_str(&premature).unwrap();
    assert_eq!(premature_value["error"]["code"], -32600);
}

#[test]
fn unknown_tool_is_invalid_params() {
    let server = build_server("version: \"1\"\n");
    send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
    notify(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);

    let response = send(
        &server,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
    );
    let value: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(value["error"]["code"], -32602);
}

#[test]
fn path_traversal_is_blocked() {
    let yaml = "filesystem:\n  allowed_globs: [\"/tmp/ws/**\"]\n  denied_globs: [\"**/.ssh/**\"]\n";
    let server = build_server(yaml);
    send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
    notify(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);

    let response = send(
        &server,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"path":"/tmp/ws/../../../etc/passwd"}}}"#,
    );
    let value: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(value["result"]["isError"], true);
}

#[test]
fn rate_limit_trips_on_the_third_call() {
    let server = build_server("tools:\n  rate_limits:\n    echo: 2\n");
    send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
    notify(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);

    let call = |id: u32| {
        send(
            &server,
            &format!(
                r#"{{"jsonrpc":"2.0","id":{id},"method":"tools/call","params":{{"name":"echo","arguments":{{"message":"hi"}}}}}}"#
            ),
        )
    };

    let first: Value = serde_json::from_str(&call(2)).unwrap();
    let second: Value = serde_json::from_str(&call(3)).unwrap();
    let third: Value = serde_json::from_str(&call(4)).unwrap();

    assert_eq!(first["result"]["isError"], false);
    assert_eq!(second["result"]["isError"], false);
    assert_eq!(third["result"]["isError"], true);
    assert_eq!(third["result"]["content"][0]["text"], "Rate limit exceeded");
}

#[test]
fn oversized_message_is_rejected_without_touching_lifecycle() {
    let server = build_server("version: \"1\"\n");
    let oversized = vec![b'a'; 1_500_000];
    let response = match server.handle(&oversized) {
        HandlerOutcome::Response(s) => s,
        _ => panic!("expected a response"),
    };
    let value: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(value["error"]["code"], -32600);
    assert!(value["id"].is_null());
}

#[test]
fn network_rejection_for_disallowed_ip() {
    let server = build_server("version: \"1\"\n");
    send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
    notify(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);

    let response = send(
        &server,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"url":"http://8.8.8.8/"}}}"#,
    );
    let value: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(value["result"]["isError"], true);
}
