//! Shared test support: an in-memory transport driven by a script.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use harbor_mcp::core::error::{McpError, McpResult};
use harbor_mcp::transport::{Transport, TransportConfig, TransportState};

/// Maps each outbound frame to the frames the fake server sends back.
pub type Script = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Handles the test keeps after the transport moves into the endpoint.
#[derive(Clone)]
pub struct MockHandles {
    outbound: Arc<Mutex<Vec<Value>>>,
    inject: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl MockHandles {
    /// Every frame the client has written, in order.
    pub fn outbound(&self) -> Vec<Value> {
        self.outbound.lock().unwrap().clone()
    }

    /// Frames the client wrote for the given method.
    pub fn outbound_with_method(&self, method: &str) -> Vec<Value> {
        self.outbound()
            .into_iter()
            .filter(|frame| frame.get("method").and_then(Value::as_str) == Some(method))
            .collect()
    }

    /// Push a frame into the client's inbound stream, as if the server sent it.
    pub fn inject(&self, frame: Value) {
        let guard = self.inject.lock().unwrap();
        let tx = guard.as_ref().expect("transport not subscribed yet");
        tx.send(serde_json::to_vec(&frame).unwrap())
            .expect("inbound stream closed");
    }

    /// Close the inbound stream, as if the server went away.
    pub fn close_stream(&self) {
        let mut guard = self.inject.lock().unwrap();
        *guard = None;
    }
}

/// In-memory transport whose peer behavior is a closure.
pub struct MockTransport {
    config: TransportConfig,
    script: Script,
    state_tx: watch::Sender<TransportState>,
    handles: MockHandles,
    message_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MockTransport {
    pub fn new(script: Script) -> (Self, MockHandles) {
        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        let handles = MockHandles {
            outbound: Arc::new(Mutex::new(Vec::new())),
            inject: Arc::new(Mutex::new(None)),
        };
        (
            Self {
                config: TransportConfig::default(),
                script,
                state_tx,
                handles: handles.clone(),
                message_rx: None,
            },
            handles,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&mut self) -> McpResult<()> {
        self.state_tx.send_replace(TransportState::Connected);
        Ok(())
    }

    async fn stop(&mut self) -> McpResult<()> {
        self.state_tx.send_replace(TransportState::Disconnected);
        self.handles.close_stream();
        Ok(())
    }

    async fn send(&mut self, data: &[u8], _timeout: Option<std::time::Duration>) -> McpResult<()> {
        if *self.state_tx.borrow() != TransportState::Connected {
            return Err(McpError::invalid_state("not connected"));
        }
        if data.len() > self.config.max_message_size {
            return Err(McpError::MessageTooLarge(data.len()));
        }

        let frame: Value = serde_json::from_slice(data).expect("client wrote non-JSON frame");
        self.handles.outbound.lock().unwrap().push(frame.clone());

        for reply in (self.script)(&frame) {
            let guard = self.handles.inject.lock().unwrap();
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(serde_json::to_vec(&reply).unwrap());
            }
        }
        Ok(())
    }

    fn messages(&mut self) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.handles.inject.lock().unwrap() = Some(tx);
        rx
    }

    fn state(&self) -> TransportState {
        self.state_tx.borrow().clone()
    }

    fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.state_tx.subscribe()
    }

    fn connection_info(&self) -> String {
        "mock transport".to_string()
    }
}

/// A script that answers `initialize` with the given capabilities, swallows
/// notifications, and lets `and_then` answer everything else.
pub fn handshake_script<F>(capabilities: Value, and_then: F) -> Script
where
    F: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
{
    Arc::new(move |frame: &Value| {
        let method = frame.get("method").and_then(Value::as_str);
        match method {
            Some("initialize") => {
                let id = frame["id"].clone();
                vec![json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2025-06-18",
                        "capabilities": capabilities,
                        "serverInfo": {"name": "mock-server", "version": "0.0.1"}
                    }
                })]
            }
            Some(_) if frame.get("id").is_none() => Vec::new(),
            _ => and_then(frame),
        }
    })
}

/// Script answering initialize only; every other request gets no response.
pub fn silent_script(capabilities: Value) -> Script {
    handshake_script(capabilities, |_| Vec::new())
}

/// Give spawned router tasks a moment to drain injected frames.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
