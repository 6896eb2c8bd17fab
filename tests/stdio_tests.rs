//! End-to-end stdio transport tests against real child processes.

#![cfg(feature = "stdio")]

use std::collections::HashMap;
use std::time::Duration;

use harbor_mcp::client::EndpointBuilder;
use harbor_mcp::core::error::McpError;
use harbor_mcp::transport::{StdioTransport, Transport, TransportConfig, TransportState};

#[tokio::test]
async fn echo_round_trip_ends_disconnected() {
    let mut transport = StdioTransport::new("echo", vec!["hello-world"]);
    let mut messages = transport.messages();
    transport.start().await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for echo output")
        .expect("stream ended before yielding a frame");
    assert!(String::from_utf8_lossy(&frame).contains("hello-world"));

    let end = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for EOF");
    assert!(end.is_none());
    assert_eq!(transport.state(), TransportState::Disconnected);

    transport.stop().await.unwrap();
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[tokio::test]
async fn cat_echoes_frames_with_newline_framing() {
    let mut transport = StdioTransport::new("cat", vec![]);
    let mut messages = transport.messages();
    transport.start().await.unwrap();

    let payload = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    transport.send(payload, None).await.unwrap();

    // cat sends the exact line back; the reader strips the newline
    let frame = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for cat echo")
        .expect("stream ended unexpectedly");
    assert_eq!(frame, payload.to_vec());

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn oversize_send_never_reaches_the_child() {
    let config = TransportConfig {
        max_message_size: 10,
        ..Default::default()
    };
    let mut transport = StdioTransport::with_config("cat", vec![], HashMap::new(), config);
    let mut messages = transport.messages();
    transport.start().await.unwrap();

    match transport.send(&[b'x'; 100], None).await {
        Err(McpError::MessageTooLarge(size)) => assert_eq!(size, 100),
        other => panic!("expected MessageTooLarge, got {other:?}"),
    }

    // cat received nothing, so nothing comes back before we stop
    transport.stop().await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for stream end");
    assert!(end.is_none());
}

#[tokio::test]
async fn send_after_stop_reports_not_connected() {
    let mut transport = StdioTransport::new("cat", vec![]);
    transport.start().await.unwrap();
    transport.stop().await.unwrap();

    match transport.send(b"Hello?", None).await {
        Err(McpError::InvalidState(reason)) => assert!(reason.contains("not connected")),
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[tokio::test]
async fn environment_overlay_reaches_the_child() {
    let mut env = HashMap::new();
    env.insert("HARBOR_TEST_MARKER".to_string(), "42".to_string());
    let mut transport = StdioTransport::with_config(
        "sh",
        vec!["-c", "echo \"$HARBOR_TEST_MARKER\""],
        env,
        TransportConfig::default(),
    );
    let mut messages = transport.messages();
    transport.start().await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for child output")
        .expect("stream ended before yielding a frame");
    assert_eq!(frame, b"42".to_vec());
}

/// A shell script that plays the server side of the handshake: answer
/// initialize, swallow the initialized notification, answer tools/list.
const SH_SERVER: &str = r#"
read init_request
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"sh-server","version":"1.0"}}}'
read initialized_notification
read tools_request
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"shell-tool","description":"from sh","inputSchema":{"type":"object"}}]}}'
"#;

#[tokio::test]
async fn full_handshake_against_a_scripted_server() {
    let endpoint = EndpointBuilder::new("stdio-test", "0.1.0")
        .connect_timeout(Duration::from_secs(10))
        .request_timeout(Duration::from_secs(10))
        .build();

    let transport = StdioTransport::new("sh", vec!["-c", SH_SERVER]);
    let init = endpoint.start(transport).await.unwrap();
    assert_eq!(init.server_info.name, "sh-server");
    assert!(init.capabilities.tools.is_some());

    let tools = endpoint.list_tools(None).await.unwrap();
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(tools.tools[0].name, "shell-tool");

    endpoint.stop().await.unwrap();
}

#[tokio::test]
async fn empty_and_blank_lines_are_skipped() {
    let script = "printf '\\n  \\n{\"ok\":1}\\n'";
    let mut transport = StdioTransport::new("sh", vec!["-c", script]);
    let mut messages = transport.messages();
    transport.start().await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for output")
        .expect("stream ended before yielding a frame");
    assert_eq!(frame, br#"{"ok":1}"#.to_vec());

    let end = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for EOF");
    assert!(end.is_none());
}
