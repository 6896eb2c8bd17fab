//! Host aggregation, notification-driven cache refresh, and health queries
//! over in-memory transports.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use common::{settle, silent_script, MockTransport, Script};
use harbor_mcp::core::error::McpError;
use harbor_mcp::host::{HostConfig, McpHost};
use harbor_mcp::protocol::methods::CapabilityKind;

/// A fake tool server whose tool list can be swapped mid-test.
fn tool_server(tools: Arc<Mutex<Vec<Value>>>) -> Script {
    common::handshake_script(json!({"tools": {"listChanged": true}}), move |frame| {
        match frame["method"].as_str() {
            Some("tools/list") => {
                let tools = tools.lock().unwrap().clone();
                vec![json!({
                    "jsonrpc": "2.0",
                    "id": frame["id"],
                    "result": {"tools": tools}
                })]
            }
            Some("tools/call") => vec![json!({
                "jsonrpc": "2.0",
                "id": frame["id"],
                "result": {"content": [{"type": "text", "text": "done"}], "isError": false}
            })],
            _ => Vec::new(),
        }
    })
}

fn tool_definition(name: &str) -> Value {
    json!({
        "name": name,
        "description": "a test tool",
        "inputSchema": {"type": "object"}
    })
}

#[tokio::test]
async fn connect_primes_the_tool_cache() {
    let tools = Arc::new(Mutex::new(vec![tool_definition("search")]));
    let (transport, _handles) = MockTransport::new(tool_server(Arc::clone(&tools)));

    let host = McpHost::with_defaults();
    host.connect("alpha", transport).await.unwrap();

    let cached = host.tools("alpha").await;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].name, "search");

    let aggregated = host.available_tools().await;
    assert_eq!(aggregated.len(), 1);
    assert_eq!(aggregated[0].connection, "alpha");
}

#[tokio::test]
async fn duplicate_connection_names_are_rejected() {
    let (first, _h1) = MockTransport::new(silent_script(json!({})));
    let (second, _h2) = MockTransport::new(silent_script(json!({})));

    let host = McpHost::with_defaults();
    host.connect("alpha", first).await.unwrap();
    let result = host.connect("alpha", second).await;
    assert!(matches!(result, Err(McpError::InvalidState(_))));
}

#[tokio::test]
async fn list_changed_notification_refreshes_the_cache() {
    let tools = Arc::new(Mutex::new(vec![tool_definition("one")]));
    let (transport, handles) = MockTransport::new(tool_server(Arc::clone(&tools)));

    let host = McpHost::with_defaults();
    host.connect("alpha", transport).await.unwrap();
    assert_eq!(host.tools("alpha").await.len(), 1);

    // The server grows a tool and announces the change
    tools
        .lock()
        .unwrap()
        .push(tool_definition("two"));
    handles.inject(json!({
        "jsonrpc": "2.0",
        "method": "notifications/tools/list_changed"
    }));
    settle().await;

    let cached = host.tools("alpha").await;
    assert_eq!(cached.len(), 2);
}

#[tokio::test]
async fn aggregation_spans_connections() {
    let tools_a = Arc::new(Mutex::new(vec![tool_definition("alpha-tool")]));
    let tools_b = Arc::new(Mutex::new(vec![
        tool_definition("beta-tool"),
        tool_definition("beta-tool"), // duplicate within one server
    ]));
    let (transport_a, _ha) = MockTransport::new(tool_server(tools_a));
    let (transport_b, _hb) = MockTransport::new(tool_server(tools_b));

    let host = McpHost::with_defaults();
    host.connect("alpha", transport_a).await.unwrap();
    host.connect("beta", transport_b).await.unwrap();

    let mut aggregated: Vec<(String, String)> = host
        .available_tools()
        .await
        .into_iter()
        .map(|entry| (entry.connection, entry.tool.name))
        .collect();
    aggregated.sort();

    // Deduplicated by (connection, tool name)
    assert_eq!(
        aggregated,
        vec![
            ("alpha".to_string(), "alpha-tool".to_string()),
            ("beta".to_string(), "beta-tool".to_string()),
        ]
    );
}

#[tokio::test]
async fn call_tool_updates_the_activity_clock() {
    let tools = Arc::new(Mutex::new(vec![tool_definition("work")]));
    let (transport, _handles) = MockTransport::new(tool_server(tools));

    let host = McpHost::with_defaults();
    host.connect("alpha", transport).await.unwrap();

    // Fresh connection is active
    assert!(host
        .inactive_connections(Duration::from_secs(60))
        .await
        .is_empty());

    let result = host.call_tool("alpha", "work", None).await.unwrap();
    assert_eq!(result.is_error, Some(false));

    // Everything is inactive against a zero threshold once the clock ticks
    tokio::time::sleep(Duration::from_millis(20)).await;
    let inactive = host.inactive_connections(Duration::from_millis(1)).await;
    assert_eq!(inactive, vec!["alpha".to_string()]);
}

#[tokio::test]
async fn capability_filter_selects_matching_connections() {
    let (with_tools, _h1) =
        MockTransport::new(silent_script(json!({"tools": {"listChanged": true}})));
    let (with_prompts, _h2) = MockTransport::new(silent_script(json!({"prompts": {}})));

    let host = McpHost::with_defaults();
    host.connect("tooling", with_tools).await.unwrap();
    host.connect("prompting", with_prompts).await.unwrap();

    assert_eq!(
        host.connections_supporting(CapabilityKind::Tools).await,
        vec!["tooling".to_string()]
    );
    assert_eq!(
        host.connections_supporting(CapabilityKind::Prompts).await,
        vec!["prompting".to_string()]
    );
    assert!(host
        .connections_supporting(CapabilityKind::Logging)
        .await
        .is_empty());
}

#[tokio::test]
async fn stream_end_marks_the_connection_closed() {
    let (transport, handles) = MockTransport::new(silent_script(json!({})));
    let host = McpHost::with_defaults();
    host.connect("alpha", transport).await.unwrap();

    handles.close_stream();
    settle().await;

    // A clean close parks the endpoint disconnected, not failed
    let state = host.connection_state("alpha").await.unwrap();
    assert_eq!(state, harbor_mcp::client::EndpointState::Disconnected);
    assert!(host.failed_connections().await.is_empty());
}

#[tokio::test]
async fn disconnect_removes_the_connection() {
    let (transport, _handles) = MockTransport::new(silent_script(json!({})));
    let host = McpHost::with_defaults();
    host.connect("alpha", transport).await.unwrap();
    assert_eq!(host.connection_names().await, vec!["alpha".to_string()]);

    host.disconnect("alpha").await.unwrap();
    assert!(host.connection_names().await.is_empty());
    assert!(host.available_tools().await.is_empty());
}

#[tokio::test]
async fn shutdown_closes_every_connection() {
    let (transport_a, _ha) = MockTransport::new(silent_script(json!({})));
    let (transport_b, _hb) = MockTransport::new(silent_script(json!({})));

    let host = McpHost::new(HostConfig::default());
    host.connect("alpha", transport_a).await.unwrap();
    host.connect("beta", transport_b).await.unwrap();

    host.shutdown().await;
    assert!(host.connection_names().await.is_empty());
}

#[tokio::test]
async fn refresh_skips_servers_without_the_capability() {
    let (transport, handles) = MockTransport::new(silent_script(json!({})));
    let host = McpHost::with_defaults();
    host.connect("alpha", transport).await.unwrap();
    let frames_before = handles.outbound().len();

    // The server has no tools capability: the refresh is a gated no-op
    host.refresh_tools("alpha").await.unwrap();
    assert_eq!(handles.outbound().len(), frames_before);
    assert!(host.tools("alpha").await.is_empty());
}
