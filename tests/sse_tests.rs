//! SSE transport tests against a minimal in-process HTTP server.

#![cfg(feature = "sse")]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use harbor_mcp::core::error::McpError;
use harbor_mcp::transport::{SseTransport, Transport, TransportState};

/// How the fake server behaves.
#[derive(Clone, Copy)]
struct ServerBehavior {
    /// HTTP status for POSTs
    post_status: u16,
    /// Close the GET right after the endpoint event instead of staying open
    close_after_endpoint: bool,
}

async fn read_head(socket: &mut TcpStream) -> Vec<u8> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    head
}

/// Serve GET as an SSE stream with an endpoint event plus one message;
/// answer POSTs with the configured status.
async fn spawn_server(behavior: ServerBehavior) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let head_text = String::from_utf8_lossy(&head).to_string();

                if head_text.starts_with("GET") {
                    let _ = socket
                        .write_all(
                            b"HTTP/1.1 200 OK\r\n\
                              Content-Type: text/event-stream\r\n\
                              Cache-Control: no-cache\r\n\r\n",
                        )
                        .await;
                    let _ = socket
                        .write_all(b"event: endpoint\ndata: /message?sessionId=test-1\n\n")
                        .await;
                    let _ = socket
                        .write_all(
                            b"data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\
                              \"params\":{\"level\":\"info\",\"data\":\"hi\"}}\n\n",
                        )
                        .await;
                    if behavior.close_after_endpoint {
                        return;
                    }
                    tokio::time::sleep(Duration::from_secs(30)).await;
                } else if head_text.starts_with("POST") {
                    let status_line = match behavior.post_status {
                        202 => "HTTP/1.1 202 Accepted",
                        _ => "HTTP/1.1 500 Internal Server Error",
                    };
                    let response =
                        format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            });
        }
    });

    format!("http://{addr}/sse")
}

async fn wait_for_endpoint(transport: &SseTransport) {
    for _ in 0..200 {
        if transport.post_endpoint().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server endpoint was never discovered");
}

#[tokio::test]
async fn endpoint_discovery_then_post_succeeds() {
    let url = spawn_server(ServerBehavior {
        post_status: 202,
        close_after_endpoint: false,
    })
    .await;

    let mut transport = SseTransport::new(&url).unwrap();
    transport.start().await.unwrap();
    let mut messages = transport.messages();

    wait_for_endpoint(&transport).await;
    let endpoint = transport.post_endpoint().unwrap();
    assert!(endpoint.as_str().ends_with("/message?sessionId=test-1"));
    assert_eq!(transport.state(), TransportState::Connected);

    // The non-endpoint event arrived on the message stream verbatim
    let frame = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for SSE frame")
        .expect("stream ended unexpectedly");
    let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(value["method"], "notifications/message");

    // POST to the advertised endpoint succeeds on 2xx
    transport.send(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, None)
        .await
        .unwrap();

    transport.stop().await.unwrap();
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[tokio::test]
async fn post_failure_keeps_the_downchannel_open() {
    let url = spawn_server(ServerBehavior {
        post_status: 500,
        close_after_endpoint: false,
    })
    .await;

    let mut transport = SseTransport::new(&url).unwrap();
    transport.start().await.unwrap();
    let _messages = transport.messages();
    wait_for_endpoint(&transport).await;

    let result = transport.send(b"{}", None).await;
    match result {
        Err(McpError::InvalidState(reason)) => assert!(reason.contains("POST failed to")),
        other => panic!("expected POST failure, got {other:?}"),
    }

    // The GET stream is unaffected
    assert_eq!(transport.state(), TransportState::Connected);

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn send_before_discovery_is_rejected() {
    // A server that never sends the endpoint event
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\r\n",
                    )
                    .await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    let mut transport = SseTransport::new(&format!("http://{addr}/sse")).unwrap();
    transport.start().await.unwrap();
    let _messages = transport.messages();

    // Wait for the headers to land
    for _ in 0..200 {
        if transport.state() == TransportState::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.state(), TransportState::Connected);

    match transport.send(b"{}", None).await {
        Err(McpError::InvalidState(reason)) => {
            assert!(reason.contains("server endpoint not known yet"));
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn server_close_disconnects_and_restart_reconnects() {
    let url = spawn_server(ServerBehavior {
        post_status: 202,
        close_after_endpoint: true,
    })
    .await;

    let mut transport = SseTransport::new(&url).unwrap();
    transport.start().await.unwrap();
    let mut messages = transport.messages();
    let first_session = transport.session_id().to_string();

    // Drain the stream to its natural end
    while let Some(_frame) = messages.recv().await {}
    assert_eq!(transport.state(), TransportState::Disconnected);

    // Reconnect: fresh session id, fresh stream, endpoint rediscovered
    transport.start().await.unwrap();
    let mut messages = transport.messages();
    assert_ne!(transport.session_id(), first_session);

    let frame = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("timed out waiting for reconnect frame")
        .expect("reconnected stream ended unexpectedly");
    assert!(!frame.is_empty());
    wait_for_endpoint(&transport).await;

    transport.stop().await.unwrap();
}

#[tokio::test]
async fn non_sse_response_fails_the_transport() {
    // Plain HTTP 200 without the event-stream content type
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = read_head(&mut socket).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 0\r\n\r\n",
                )
                .await;
        }
    });

    let mut transport = SseTransport::new(&format!("http://{addr}/sse")).unwrap();
    transport.start().await.unwrap();
    let _messages = transport.messages();

    for _ in 0..200 {
        if matches!(transport.state(), TransportState::Failed(_)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    match transport.state() {
        TransportState::Failed(reason) => assert!(reason.contains("content-type")),
        other => panic!("expected failure, got {other:?}"),
    }
}
